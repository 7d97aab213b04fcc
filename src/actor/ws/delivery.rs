use tungstenite::protocol::Message;

use super::WsActor;

impl WsActor {
    /// Send a message to the clients of `platform`, dropping dead ones.
    pub(super) fn send_to_platform(&self, platform: &str, msg: Message) {
        let mut clients = self.clients.lock();
        let mut sent = 0;

        clients.retain_mut(|client| {
            let matches = client.platform.as_deref().is_none_or(|p| p == platform);
            if !matches {
                return true;
            }

            match client.ws.send(msg.clone()) {
                Ok(_) => {
                    sent += 1;
                    true
                }
                Err(e) => {
                    crate::debug!("hmr"; "client disconnected: {}", e);
                    false
                }
            }
        });

        crate::debug!("hmr"; "sent to {} {} client(s)", sent, platform);
    }
}
