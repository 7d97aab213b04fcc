//! Utility modules for the dev server.

pub mod exec;
pub mod mime;
