//! Hot Module Replacement notifications.
//!
//! ```text
//! Compiler hooks -> BuildDelegate -> WsActor -> HMR clients (per platform)
//! ```
//!
//! # Modules
//!
//! - `message` - HMR wire messages (`building`, `built`, `sync`)
//! - `server` - WebSocket acceptor feeding clients to the WsActor

pub mod message;
pub mod server;
