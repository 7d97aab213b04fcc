//! Project configuration management for `repack.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # [build], [server], [targets.<platform>]
//! ├── error          # ConfigError, ConfigDiagnostics
//! ├── util           # config discovery, path expansion
//! └── mod.rs         # ProjectConfig (this file)
//! ```
//!
//! A missing `repack.toml` is not an error: defaults are used with the
//! current directory as project root.

mod error;
pub mod section;
mod util;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use error::{ConfigDiagnostics, ConfigError};
pub use section::{BuildMode, BuildSectionConfig, ServerConfig, TargetSection};

use crate::cli::{Cli, StartArgs};
use crate::log;
use util::{expand_path, find_config_file};

/// Root configuration structure representing repack.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory, parent of the config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    pub server: ServerConfig,

    pub build: BuildSectionConfig,

    /// Per-platform overrides
    pub targets: BTreeMap<String, TargetSection>,
}

impl ProjectConfig {
    /// Load configuration for the given CLI invocation.
    ///
    /// Searches upward from cwd for the config file. The project root is the
    /// config file's parent directory.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;

        let mut config = match find_config_file(&cli.config) {
            Some(path) => {
                let mut config = Self::from_path(&path)?;
                config.root = path.parent().map(Path::to_path_buf).unwrap_or(cwd);
                config.config_path = path;
                config
            }
            None => {
                crate::debug!("config"; "{} not found, using defaults", cli.config.display());
                let mut config = Self::default_at(&cwd);
                config.config_path = cwd.join(&cli.config);
                config
            }
        };

        if let Some(args) = cli.start_args() {
            config.apply_start_args(args);
        }
        config.normalize_paths();
        config.validate()?;

        Ok(config)
    }

    /// Default configuration rooted at `root`.
    pub fn default_at(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            ..Default::default()
        }
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {} (ignored): {}", display_path, fields.join(", "));
    }

    /// Platforms to compile, in configuration order.
    pub fn platforms(&self) -> &[String] {
        &self.build.platforms
    }

    // ========================================================================
    // cli overrides
    // ========================================================================

    fn apply_start_args(&mut self, args: &StartArgs) {
        Self::update_option(&mut self.server.host, args.host.as_ref());
        Self::update_option(&mut self.server.port, args.port.as_ref());
        Self::update_option(&mut self.server.hmr_port, args.hmr_port.as_ref());

        if args.cert.is_some() {
            self.server.cert = args.cert.clone();
        }
        if args.key.is_some() {
            self.server.key = args.key.clone();
        }
        if !args.platform.is_empty() {
            self.build.platforms = args.platform.clone();
        }
        if args.workers {
            self.build.mode = BuildMode::Worker;
        }
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    fn normalize_paths(&mut self) {
        let root = self.root.clone();
        self.server.cert = self.server.cert.take().map(|p| expand_path(&p, &root));
        self.server.key = self.server.key.take().map(|p| expand_path(&p, &root));
    }

    // ========================================================================
    // validation
    // ========================================================================

    /// Collects all validation errors and returns them at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut diag = ConfigDiagnostics::new();
        let build = &self.build;

        if build.platforms.is_empty() {
            diag.error("build.platforms", "at least one platform is required");
        }
        for (i, platform) in build.platforms.iter().enumerate() {
            if platform.is_empty() || platform.contains(['/', '\\', '.']) {
                diag.error("build.platforms", format!("invalid platform name `{platform}`"));
            }
            if build.platforms[..i].contains(platform) {
                diag.error("build.platforms", format!("duplicate platform `{platform}`"));
            }
        }

        if build.command.is_empty() {
            diag.error_with_hint(
                "build.command",
                "build command must not be empty",
                "e.g. command = [\"npx\", \"rspack\", \"build\", \"--output-path\", \"{output}\"]",
            );
        }
        for (platform, target) in &self.targets {
            if target.command.as_ref().is_some_and(Vec::is_empty) {
                diag.error(&format!("targets.{platform}.command"), "command must not be empty");
            }
        }

        match (&self.server.cert, &self.server.key) {
            (Some(_), None) => diag.error("server.key", "`cert` is set but `key` is missing"),
            (None, Some(_)) => diag.error("server.cert", "`key` is set but `cert` is missing"),
            _ => {}
        }
        if self.server.port == self.server.hmr_port {
            diag.error_with_hint(
                "server.hmr_port",
                "HMR port must differ from the HTTP port",
                format!("default is {}", ServerConfig::default().hmr_port),
            );
        }

        diag.into_result()
    }
}

// ============================================================================
// Test Helpers (available to all modules via `use crate::config::test_*`)
// ============================================================================

/// Parse config, asserting there are no unknown fields.
#[cfg(test)]
pub fn test_parse_config(content: &str) -> ProjectConfig {
    let (parsed, ignored) = ProjectConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_unknown_fields_collected() {
        let (_, ignored) =
            ProjectConfig::parse_with_ignored("[build]\nplatform = \"ios\"\n[typo]\na = 1").unwrap();
        assert!(ignored.contains(&"build.platform".to_string()));
        assert!(ignored.contains(&"typo".to_string()));
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "repack", "start", "--port", "9000", "--platform", "android", "--workers",
        ])
        .unwrap();
        let mut config = ProjectConfig::default_at(Path::new("/app"));
        config.apply_start_args(cli.start_args().unwrap());

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.platforms(), ["android"]);
        assert_eq!(config.build.mode, BuildMode::Worker);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_all_errors() {
        let mut config = test_parse_config("[build]\nplatforms = [\"ios\", \"ios\", \"../x\"]\ncommand = []");
        config.server.cert = Some("cert.pem".into());

        let Err(ConfigError::Diagnostics(diag)) = config.validate() else {
            panic!("expected diagnostics");
        };
        let fields: Vec<_> = diag.errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["build.platforms", "build.platforms", "build.command", "server.key"]
        );
    }

    #[test]
    fn test_validate_port_clash() {
        let config = test_parse_config("[server]\nport = 8081\nhmr_port = 8081");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_normalize_cert_paths() {
        let mut config = test_parse_config("[server]\ncert = \"certs/a.pem\"\nkey = \"/abs/b.pem\"");
        config.root = PathBuf::from("/app");
        config.normalize_paths();

        assert_eq!(config.server.cert, Some(PathBuf::from("/app/certs/a.pem")));
        assert_eq!(config.server.key, Some(PathBuf::from("/abs/b.pem")));
    }
}
