//! Actor Message Definitions
//!
//! ```text
//! BuildDelegate --Broadcast--> WsActor --> HMR clients
//! ws acceptor   --AddClient--> WsActor
//! ```

use std::net::TcpStream;

use crate::reload::message::HmrMessage;

/// Messages to WebSocket Actor
#[derive(Debug)]
pub enum WsMsg {
    /// Send an HMR message to the clients of one platform
    Broadcast {
        platform: String,
        message: HmrMessage,
    },
    /// New client connection (handshake pending)
    AddClient(TcpStream),
    /// Close every client and stop
    Shutdown,
}
