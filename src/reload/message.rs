//! HMR Message Protocol
//!
//! JSON messages pushed to React Native HMR clients over WebSocket.
//!
//! ```json
//! {"action":"building"}
//! {"action":"built","body":{"name":"ios","time":812,"hash":"3f2a...","warnings":[],"errors":[]}}
//! {"action":"sync","body":null}
//! ```
//!
//! `sync` is sent once right after a client connects, carrying the latest
//! `built` body of its platform so the client can catch up.

use serde::{Deserialize, Serialize};

use crate::engine::Diagnostic;

/// Summary of a platform's latest compilation, as seen by HMR clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmrBody {
    pub name: String,
    pub time: u64,
    pub hash: String,
    pub warnings: Vec<Diagnostic>,
    pub errors: Vec<Diagnostic>,
}

/// HMR message sent over WebSocket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum HmrMessage {
    /// A compilation started
    Building,
    /// A compilation finished
    Built { body: Option<HmrBody> },
    /// Initial state for a freshly connected client
    Sync { body: Option<HmrBody> },
}

impl HmrMessage {
    pub fn building() -> Self {
        Self::Building
    }

    pub fn built(body: Option<HmrBody>) -> Self {
        Self::Built { body }
    }

    pub fn sync(body: Option<HmrBody>) -> Self {
        Self::Sync { body }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"action":"building"}"#.to_string())
    }

    /// Parse from JSON string
    #[cfg(test)]
    pub fn from_json(json: &str) -> Option<Self> {
        serde_json::from_str(json).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body() -> HmrBody {
        HmrBody {
            name: "ios".into(),
            time: 812,
            hash: "3f2a".into(),
            warnings: vec![],
            errors: vec![Diagnostic::new("Module not found")],
        }
    }

    #[test]
    fn test_building_json() {
        assert_eq!(HmrMessage::building().to_json(), r#"{"action":"building"}"#);
    }

    #[test]
    fn test_built_json() {
        let json = HmrMessage::built(Some(body())).to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["action"], "built");
        assert_eq!(value["body"]["name"], "ios");
        assert_eq!(value["body"]["time"], 812);
        assert_eq!(value["body"]["errors"][0]["message"], "Module not found");
    }

    #[test]
    fn test_sync_without_body() {
        assert_eq!(HmrMessage::sync(None).to_json(), r#"{"action":"sync","body":null}"#);
    }

    #[test]
    fn test_from_json() {
        let msg = HmrMessage::from_json(r#"{"action":"built","body":null}"#).unwrap();
        assert_eq!(msg, HmrMessage::built(None));
        assert!(HmrMessage::from_json(r#"{"action":"reload"}"#).is_none());
    }
}
