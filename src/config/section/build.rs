//! `[build]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [build]
//! platforms = ["ios", "android"]
//! command = ["npx", "rspack", "build", "--env", "platform={platform}", "--output-path", "{output}"]
//! output = "build/generated"   # Output path prefix inside the in-memory filesystem
//! watch = ["src"]              # Directories that trigger rebuilds
//! ignored = ["node_modules", ".repack"]
//! aggregate_timeout = 300      # Debounce window in milliseconds
//! mode = "in-process"          # or "worker": one process per platform
//! ```
//!
//! Command placeholders: `{platform}`, `{output}` (staging directory the
//! bundler must write to), `{root}` (project root).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How platforms are compiled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildMode {
    /// One multi-target build inside the server process.
    #[default]
    InProcess,
    /// One isolated worker process per platform.
    Worker,
}

/// Build settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSectionConfig {
    pub platforms: Vec<String>,
    pub command: Vec<String>,
    pub output: PathBuf,
    pub watch: Vec<PathBuf>,
    pub ignored: Vec<String>,
    pub aggregate_timeout: u64,
    pub mode: BuildMode,
}

impl Default for BuildSectionConfig {
    fn default() -> Self {
        Self {
            platforms: vec!["ios".into(), "android".into()],
            command: [
                "npx",
                "rspack",
                "build",
                "--env",
                "platform={platform}",
                "--output-path",
                "{output}",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            output: PathBuf::from("build/generated"),
            watch: vec![PathBuf::from("src")],
            ignored: vec!["node_modules".into(), ".repack".into()],
            aggregate_timeout: 300,
            mode: BuildMode::InProcess,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    #[test]
    fn test_build_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.build.platforms, vec!["ios", "android"]);
        assert_eq!(config.build.command[0], "npx");
        assert_eq!(config.build.aggregate_timeout, 300);
        assert_eq!(config.build.mode, BuildMode::InProcess);
    }

    #[test]
    fn test_build_mode_worker() {
        let config = test_parse_config("[build]\nmode = \"worker\"\nplatforms = [\"android\"]");
        assert_eq!(config.build.mode, BuildMode::Worker);
        assert_eq!(config.build.platforms, vec!["android"]);
    }

    #[test]
    fn test_build_mode_rejects_unknown() {
        let result = toml::from_str::<BuildSectionConfig>("mode = \"threads\"");
        assert!(result.is_err());
    }
}
