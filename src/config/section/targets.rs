//! `[targets.<platform>]` sections.
//!
//! ```toml
//! [targets.android]
//! command = ["npx", "rspack", "build", "-c", "rspack.android.config.mjs", "--output-path", "{output}"]
//! env = { NODE_ENV = "development" }
//! ```
//!
//! Platforms without a section use `[build].command` and no extra env.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-platform overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSection {
    /// Replaces `[build].command` for this platform.
    pub command: Option<Vec<String>>,
    pub env: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;

    #[test]
    fn test_target_override() {
        let config = test_parse_config(
            "[targets.android]\ncommand = [\"gradle\"]\nenv = { A = \"1\" }\n[targets.ios]\n",
        );

        let android = &config.targets["android"];
        assert_eq!(android.command.as_deref(), Some(&["gradle".to_string()][..]));
        assert_eq!(android.env["A"], "1");

        let ios = &config.targets["ios"];
        assert!(ios.command.is_none());
        assert!(ios.env.is_empty());
    }
}
