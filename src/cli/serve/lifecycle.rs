//! Server lifecycle management.

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam::channel::Receiver;
use tiny_http::{Server, SslConfig};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use crate::actor::messages::WsMsg;
use crate::actor::ws::WsActor;
use crate::config::ServerConfig;
use crate::log;
use crate::reload::server::start_ws_server_with_channel;

/// Maximum number of port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;

/// Queue size between build threads and the HMR actor.
const WS_QUEUE: usize = 256;

/// Bind to the configured interface and port, with automatic port retry.
///
/// Serves HTTPS when both `cert` and `key` are configured.
pub fn bind_with_retry(config: &ServerConfig) -> Result<(Server, SocketAddr)> {
    let tls = load_tls(config)?;
    let base_port = config.port;

    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(config.host, port);

        let bound = match &tls {
            Some(tls) => Server::https(addr, clone_tls(tls)),
            None => Server::http(addr),
        };

        match bound {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(_) if offset + 1 < MAX_PORT_RETRIES => continue,
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to bind after {} attempts (ports {}-{}): {}",
                    MAX_PORT_RETRIES,
                    base_port,
                    port,
                    e
                ));
            }
        }
    }
    anyhow::bail!("Failed to bind {}:{}", config.host, base_port)
}

fn load_tls(config: &ServerConfig) -> Result<Option<SslConfig>> {
    let (Some(cert), Some(key)) = (&config.cert, &config.key) else {
        return Ok(None);
    };
    let certificate =
        fs::read(cert).with_context(|| format!("Failed to read certificate {}", cert.display()))?;
    let private_key =
        fs::read(key).with_context(|| format!("Failed to read private key {}", key.display()))?;
    Ok(Some(SslConfig {
        certificate,
        private_key,
    }))
}

fn clone_tls(tls: &SslConfig) -> SslConfig {
    SslConfig {
        certificate: tls.certificate.clone(),
        private_key: tls.private_key.clone(),
    }
}

/// HMR side of the server: the WebSocket acceptor plus the actor that owns
/// the clients, on a small tokio runtime shared with request handling.
pub struct Hmr {
    pub runtime: Runtime,
    pub ws_tx: mpsc::Sender<WsMsg>,
    pub port: u16,
}

pub fn start_hmr(host: IpAddr, base_port: u16) -> Result<Hmr> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("repack-rt")
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let (ws_tx, ws_rx) = mpsc::channel(WS_QUEUE);
    let port = start_ws_server_with_channel(host, base_port, ws_tx.clone())?;
    runtime.spawn(WsActor::new(ws_rx).run());

    Ok(Hmr {
        runtime,
        ws_tx,
        port,
    })
}

/// Forward Ctrl+C to the HMR actor so clients are closed right away.
pub fn spawn_shutdown_relay(shutdown_rx: Receiver<()>, ws_tx: mpsc::Sender<WsMsg>) -> JoinHandle<()> {
    thread::spawn(move || {
        if shutdown_rx.recv().is_ok() {
            let _ = ws_tx.blocking_send(WsMsg::Shutdown);
        }
    })
}

/// Stop the HMR actor and wait briefly for it to close its clients.
pub fn shutdown_hmr(hmr: Hmr) {
    let _ = hmr.ws_tx.try_send(WsMsg::Shutdown);
    hmr.runtime.shutdown_timeout(Duration::from_secs(2));
}
