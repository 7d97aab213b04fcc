//! Actors of the dev server.
//!
//! ```text
//! Compiler hooks --> BuildDelegate --WsMsg--> WsActor --> HMR clients
//! ```
//!
//! # Module Structure
//!
//! - `messages` - Message types for inter-actor communication
//! - `ws` - Per-platform HMR broadcast

pub mod messages;
pub mod ws;
