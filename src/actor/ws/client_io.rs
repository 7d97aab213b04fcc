use std::net::TcpStream;
use std::sync::Arc;

use parking_lot::Mutex;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::protocol::Message;

use crate::reload::message::HmrMessage;

use super::{RegisteredClient, WsActor};

impl WsActor {
    /// Handshake a new client and send it the `sync` snapshot.
    pub(super) fn add_client(&self, stream: TcpStream) {
        let mut platform = None;
        let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            platform = req.uri().query().and_then(platform_from_query);
            Ok(resp)
        };

        // Blocking during handshake, non-blocking afterwards for polling reads
        let mut ws = match tungstenite::accept_hdr(stream, callback) {
            Ok(ws) => ws,
            Err(e) => {
                crate::log!("hmr"; "handshake failed: {}", e);
                return;
            }
        };
        let _ = ws.get_ref().set_nonblocking(true);

        let sync = HmrMessage::sync(self.sync_body(platform.as_deref()));
        if let Err(e) = ws.send(Message::Text(sync.to_json().into())) {
            crate::log!("hmr"; "failed to send sync message: {}", e);
            return;
        }

        let mut clients = self.clients.lock();
        crate::debug!("hmr"; "client connected (total: {}, platform: {:?})", clients.len() + 1, platform);
        clients.push(RegisteredClient { ws, platform });
    }

    /// Background thread pruning closed connections (non-blocking poll)
    ///
    /// HMR clients never send anything meaningful, so reads only detect
    /// closes and errors.
    pub(super) fn client_reader_loop(clients: Arc<Mutex<Vec<RegisteredClient>>>) {
        loop {
            std::thread::sleep(std::time::Duration::from_millis(100));
            if crate::core::is_shutdown() {
                break;
            }

            let mut clients = clients.lock();
            clients.retain_mut(|client| match client.ws.read() {
                Ok(Message::Close(_)) => false,
                Ok(_) => true,
                Err(tungstenite::Error::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => true,
                Err(e) => {
                    crate::debug!("hmr"; "client disconnected: {}", e);
                    false
                }
            });
        }
    }
}

/// Extract `platform` from a query string like `platform=ios&dev=true`.
fn platform_from_query(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "platform")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
