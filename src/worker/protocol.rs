//! Worker wire format.
//!
//! One JSON object per line on the worker's stdout:
//!
//! ```text
//! {"type":"building"}
//! {"type":"built","body":{...},"assets":[{"name":"index.bundle","data":"6a73...","hotModuleReplacement":false}]}
//! {"type":"failed","message":"failed to watch src: ..."}
//! ```

use serde::{Deserialize, Serialize};

use crate::compiler::CompiledAsset;
use crate::engine::AssetInfo;
use crate::reload::message::HmrBody;

/// Worker to parent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    /// A rebuild started.
    Building,
    /// A compilation finished. `assets` is the full servable set.
    Built { body: HmrBody, assets: Vec<WireAsset> },
    /// Watch mode died; the worker exits after sending this.
    Failed { message: String },
}

/// An emitted file, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireAsset {
    pub name: String,
    pub data: String,
    #[serde(flatten)]
    pub info: AssetInfo,
}

impl WireAsset {
    pub fn encode(name: &str, asset: &CompiledAsset) -> Self {
        Self {
            name: name.to_string(),
            data: hex::encode(&asset.data),
            info: asset.info.clone(),
        }
    }

    pub fn decode(self) -> Result<(String, CompiledAsset), hex::FromHexError> {
        let data = hex::decode(&self.data)?;
        Ok((self.name, CompiledAsset::new(data, self.info)))
    }
}

impl WorkerMessage {
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }
}

/// What the parent observes about a worker.
#[derive(Debug)]
pub enum WorkerEvent {
    Message(WorkerMessage),
    /// Unreadable output or a broken pipe
    Error(String),
    /// The process is gone
    Exit(Option<i32>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_building_line() {
        assert_eq!(WorkerMessage::Building.to_line().unwrap(), r#"{"type":"building"}"#);
        assert_eq!(
            WorkerMessage::from_line("{\"type\":\"building\"}\n").unwrap(),
            WorkerMessage::Building
        );
    }

    #[test]
    fn test_built_line() {
        let asset = CompiledAsset::new(
            b"var a;".to_vec(),
            AssetInfo {
                hot_module_replacement: true,
                source_filename: None,
            },
        );
        let message = WorkerMessage::Built {
            body: HmrBody {
                name: "ios".into(),
                time: 12,
                hash: "abc".into(),
                warnings: vec![],
                errors: vec![],
            },
            assets: vec![WireAsset::encode("main.hot-update.js", &asset)],
        };

        let line = message.to_line().unwrap();
        assert!(line.contains(r#""data":"76617220613b""#));
        assert!(line.contains(r#""hotModuleReplacement":true"#));

        let WorkerMessage::Built { mut assets, .. } = WorkerMessage::from_line(&line).unwrap() else {
            panic!("expected built");
        };
        let (name, decoded) = assets.remove(0).decode().unwrap();
        assert_eq!(name, "main.hot-update.js");
        assert_eq!(&*decoded.data, b"var a;");
        assert!(decoded.is_hot_update());
    }

    #[test]
    fn test_bad_hex() {
        let asset = WireAsset {
            name: "a.js".into(),
            data: "zz".into(),
            info: AssetInfo::default(),
        };
        assert!(asset.decode().is_err());
    }

    #[test]
    fn test_unknown_type() {
        assert!(WorkerMessage::from_line(r#"{"type":"exploded"}"#).is_err());
    }
}
