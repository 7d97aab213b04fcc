//! WebSocket Actor - HMR broadcast
//!
//! This actor is responsible for:
//! - Accepting HMR clients (`ws://host:hmr_port/?platform=ios`)
//! - Sending every new client a `sync` message with the latest build of its platform
//! - Routing `building` / `built` messages to the clients of one platform
//!
//! # Architecture
//!
//! ```text
//! BuildDelegate --[Broadcast{platform}]--> WsActor --[platform match]--> Clients
//! ```
//!
//! Clients that connected without a `platform` query receive every message.

mod client_io;
mod delivery;

use std::net::TcpStream;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use super::messages::WsMsg;
use crate::reload::message::{HmrBody, HmrMessage};

/// A registered WebSocket client with its platform
struct RegisteredClient {
    ws: WebSocket<TcpStream>,
    platform: Option<String>,
}

/// WebSocket Actor - manages HMR client connections
pub struct WsActor {
    rx: mpsc::Receiver<WsMsg>,
    /// Connected clients (shared for broadcast + read threads)
    clients: Arc<Mutex<Vec<RegisteredClient>>>,
    /// Latest `built` body per platform, replayed as `sync` to new clients
    last_built: FxHashMap<String, Option<HmrBody>>,
}

impl WsActor {
    pub fn new(rx: mpsc::Receiver<WsMsg>) -> Self {
        Self {
            rx,
            clients: Arc::new(Mutex::new(Vec::new())),
            last_built: FxHashMap::default(),
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let clients_for_reader = Arc::clone(&self.clients);
        std::thread::spawn(move || {
            Self::client_reader_loop(clients_for_reader);
        });

        while let Some(msg) = self.rx.recv().await {
            match msg {
                WsMsg::Broadcast { platform, message } => {
                    if let HmrMessage::Built { body } = &message {
                        self.last_built.insert(platform.clone(), body.clone());
                    }
                    self.send_to_platform(&platform, Message::Text(message.to_json().into()));
                }

                WsMsg::AddClient(stream) => self.add_client(stream),

                WsMsg::Shutdown => {
                    crate::debug!("hmr"; "shutting down");
                    let mut clients = self.clients.lock();
                    for mut client in clients.drain(..) {
                        let _ = client.ws.close(None);
                    }
                    break;
                }
            }
        }
    }

    /// Body to replay to a new client of `platform`.
    fn sync_body(&self, platform: Option<&str>) -> Option<HmrBody> {
        platform
            .and_then(|p| self.last_built.get(p))
            .cloned()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    use crate::engine::Diagnostic;

    fn body(name: &str) -> HmrBody {
        HmrBody {
            name: name.into(),
            time: 10,
            hash: "abc".into(),
            warnings: vec![],
            errors: vec![Diagnostic::new("boom")],
        }
    }

    fn read_message(ws: &mut WebSocket<tungstenite::stream::MaybeTlsStream<TcpStream>>) -> HmrMessage {
        loop {
            if let Message::Text(text) = ws.read().unwrap() {
                return HmrMessage::from_json(&text).unwrap();
            }
        }
    }

    #[test]
    fn test_sync_body_per_platform() {
        let (_tx, rx) = mpsc::channel(1);
        let mut actor = WsActor::new(rx);
        actor.last_built.insert("ios".into(), Some(body("ios")));

        assert_eq!(actor.sync_body(Some("ios")), Some(body("ios")));
        assert_eq!(actor.sync_body(Some("android")), None);
        assert_eq!(actor.sync_body(None), None);
    }

    /// Connect a client; the test thread plays the acceptor.
    async fn connect(
        listener: &TcpListener,
        tx: &mpsc::Sender<WsMsg>,
        platform: &str,
    ) -> WebSocket<tungstenite::stream::MaybeTlsStream<TcpStream>> {
        let url = format!(
            "ws://127.0.0.1:{}/?platform={platform}",
            listener.local_addr().unwrap().port()
        );
        let client = std::thread::spawn(move || tungstenite::connect(url).unwrap().0);
        let (stream, _) = listener.accept().unwrap();
        tx.send(WsMsg::AddClient(stream)).await.unwrap();
        client.join().unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_clients_receive_sync_then_own_platform_only() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(WsActor::new(rx).run());

        tx.send(WsMsg::Broadcast {
            platform: "ios".into(),
            message: HmrMessage::built(Some(body("ios"))),
        })
        .await
        .unwrap();

        let mut ios = connect(&listener, &tx, "ios").await;
        assert_eq!(read_message(&mut ios), HmrMessage::sync(Some(body("ios"))));

        let mut android = connect(&listener, &tx, "android").await;
        assert_eq!(read_message(&mut android), HmrMessage::sync(None));

        tx.send(WsMsg::Broadcast {
            platform: "android".into(),
            message: HmrMessage::building(),
        })
        .await
        .unwrap();
        tx.send(WsMsg::Broadcast {
            platform: "ios".into(),
            message: HmrMessage::built(None),
        })
        .await
        .unwrap();

        // android never sees the ios message, ios never sees the android one
        assert_eq!(read_message(&mut android), HmrMessage::building());
        assert_eq!(read_message(&mut ios), HmrMessage::built(None));

        tx.send(WsMsg::Shutdown).await.unwrap();
    }
}
