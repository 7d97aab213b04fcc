//! `[server]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"    # 0.0.0.0 to reach the server from a device on the LAN
//! port = 8081           # HTTP port (bundles, source maps, symbolication)
//! hmr_port = 8082       # WebSocket port for HMR clients
//! cert = "~/certs/dev.pem"
//! key = "~/certs/dev-key.pem"
//! ```
//!
//! HTTPS is enabled when both `cert` and `key` are set.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Development server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Network interface to bind.
    pub host: IpAddr,

    /// HTTP port number.
    pub port: u16,

    /// WebSocket port for HMR clients.
    pub hmr_port: u16,

    /// TLS certificate (PEM).
    pub cert: Option<PathBuf>,

    /// TLS private key (PEM).
    pub key: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 8081,
            hmr_port: 8082,
            cert: None,
            key: None,
        }
    }
}

impl ServerConfig {
    pub fn is_https(&self) -> bool {
        self.cert.is_some() && self.key.is_some()
    }
}
