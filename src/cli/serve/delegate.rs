//! Build notifications for the terminal and HMR clients.

use tokio::sync::mpsc;

use crate::actor::messages::WsMsg;
use crate::compiler::{BuildDelegate, CompilerError};
use crate::logger::{status_error, status_pending, status_success, status_warning};
use crate::reload::message::{HmrBody, HmrMessage};

/// Forwards HMR messages to the [`WsActor`](crate::actor::ws::WsActor) and
/// keeps the watch status line current.
///
/// Called from build threads, so messages are queued with `try_send`; a full
/// queue drops the message rather than stalling a build.
pub struct ServerDelegate {
    ws_tx: mpsc::Sender<WsMsg>,
}

impl ServerDelegate {
    pub fn new(ws_tx: mpsc::Sender<WsMsg>) -> Self {
        Self { ws_tx }
    }

    fn report(platform: &str, body: &HmrBody) {
        if !body.errors.is_empty() {
            let detail = body
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            status_error(&format!("{platform} failed to compile"), &detail);
            return;
        }
        for warning in &body.warnings {
            status_warning(&format!("{platform}: {}", warning.message));
        }
        status_success(&format!("{platform} built in {}ms", body.time));
    }
}

impl BuildDelegate for ServerDelegate {
    fn notify_build_start(&self, platform: &str) {
        status_pending(&format!("{platform} building..."));
    }

    fn notify_build_end(&self, platform: &str) {
        crate::debug!("build"; "{} finished", platform);
    }

    fn broadcast_to_hmr_clients(&self, message: HmrMessage, platform: &str) {
        if let HmrMessage::Built { body: Some(body) } = &message {
            Self::report(platform, body);
        }

        let msg = WsMsg::Broadcast {
            platform: platform.to_string(),
            message,
        };
        if let Err(e) = self.ws_tx.try_send(msg) {
            crate::debug!("hmr"; "dropped message for {}: {}", platform, e);
        }
    }

    fn notify_build_failed(&self, error: &CompilerError) {
        status_error("build failed", &error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_is_queued() {
        let (tx, mut rx) = mpsc::channel(4);
        let delegate = ServerDelegate::new(tx);

        delegate.broadcast_to_hmr_clients(HmrMessage::building(), "ios");

        match rx.try_recv().unwrap() {
            WsMsg::Broadcast { platform, message } => {
                assert_eq!(platform, "ios");
                assert_eq!(message, HmrMessage::Building);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_full_queue_does_not_block() {
        let (tx, _rx) = mpsc::channel(1);
        let delegate = ServerDelegate::new(tx);
        delegate.broadcast_to_hmr_clients(HmrMessage::building(), "ios");
        delegate.broadcast_to_hmr_clients(HmrMessage::building(), "android");
    }
}
