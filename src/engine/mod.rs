//! Build engine abstraction.
//!
//! The orchestrator never talks to a concrete bundler. It drives anything
//! that implements [`BuildEngine`]: a multi-target build where every target
//! is one platform, reporting its lifecycle through [`BuildObserver`].
//!
//! ```text
//! EngineFactory --load_target(p)--> TargetConfig (tagged with p)
//!               --create(targets, MemoryFs)--> BuildEngine
//!
//! BuildEngine --watch_run / invalid / done(MultiStats)--> BuildObserver
//! ```
//!
//! Outputs never touch the disk from the orchestrator's point of view: every
//! engine writes into the shared [`MemoryFs`] and reports what it wrote in
//! [`ChildStats::assets`].

pub mod command;
pub mod manifest;
pub mod memfs;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memfs::MemoryFs;

// =============================================================================
// Stats
// =============================================================================

/// Metadata attached to an emitted asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetInfo {
    /// Hot update payload, only valid until the next compilation.
    #[serde(default)]
    pub hot_module_replacement: bool,
    /// Source file the asset was copied from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_filename: Option<String>,
}

/// What kind of output an emitted file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// Servable output (bundle, chunk, manifest, map, image...)
    Asset,
    /// Written by the build but not meant to be served
    Hidden,
}

/// One emitted file as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsAsset {
    /// Path relative to the target's output path
    pub name: String,
    pub kind: AssetKind,
    pub info: AssetInfo,
    pub size: u64,
}

/// A warning or error reported by a compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            module_name: None,
        }
    }
}

/// Result of one target's compilation.
#[derive(Debug, Clone, Default)]
pub struct ChildStats {
    /// Target name, always the platform
    pub name: String,
    /// Compilation time in milliseconds
    pub time: u64,
    /// Content hash of the emitted set
    pub hash: String,
    /// Output directory inside the memory filesystem
    pub output_path: PathBuf,
    pub assets: Vec<StatsAsset>,
    pub warnings: Vec<Diagnostic>,
    pub errors: Vec<Diagnostic>,
}

/// Result of one aggregate build over all targets.
#[derive(Debug, Clone, Default)]
pub struct MultiStats {
    pub children: Vec<ChildStats>,
}

// =============================================================================
// Configuration
// =============================================================================

/// Watch-mode settings shared by all targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    /// Quiet period before a batch of file changes triggers a rebuild
    pub aggregate_timeout: Duration,
    /// Directories to watch recursively
    pub roots: Vec<PathBuf>,
    /// Path segments that never trigger a rebuild
    pub ignored: Vec<String>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            aggregate_timeout: Duration::from_millis(300),
            roots: Vec::new(),
            ignored: Vec::new(),
        }
    }
}

/// Build configuration of a single target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    /// Platform this target builds for
    pub name: String,
    /// Bundler command line, with `{platform}`, `{output}` and `{root}` placeholders
    pub command: Vec<String>,
    /// Extra environment for the bundler process
    pub env: Vec<(String, String)>,
    /// Output directory inside the memory filesystem
    pub output_path: PathBuf,
    pub watch_options: WatchOptions,
}

// =============================================================================
// Engine interface
// =============================================================================

/// Fatal errors of the build engine itself, as opposed to compilation
/// errors which are reported in [`ChildStats::errors`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("failed to watch {}: {message}", .path.display())]
    Watch { path: PathBuf, message: String },

    #[error("{0}")]
    Engine(String),
}

/// Lifecycle hooks of a multi-target build.
///
/// Hooks are invoked serially from the engine's watch thread.
pub trait BuildObserver: Send + Sync {
    /// A build starts from a clean slate (first compilation in watch mode).
    fn watch_run(&self);

    /// A watching build was invalidated by a file change.
    fn invalid(&self);

    /// The aggregate build over all targets finished.
    fn done(&self, stats: &MultiStats);
}

/// Callback for fatal watch errors.
pub type FatalHandler = Box<dyn Fn(BuildError) + Send + Sync>;

/// A multi-target incremental build.
pub trait BuildEngine: Send {
    /// Register an observer for lifecycle hooks.
    fn subscribe(&mut self, observer: Arc<dyn BuildObserver>);

    /// Start watch mode. Returns once watching is set up; compilations run
    /// in the background. Calling `watch` again restarts watch mode.
    fn watch(&mut self, options: WatchOptions, on_fatal: FatalHandler) -> Result<(), BuildError>;

    /// Stop watch mode, if running.
    fn close(&mut self);
}

/// Creates build engines from per-platform configuration.
pub trait EngineFactory {
    /// Load the build configuration for one platform.
    fn load_target(&self, platform: &str) -> anyhow::Result<TargetConfig>;

    /// Construct an engine building all `targets` into `output_fs`.
    fn create(
        &self,
        targets: Vec<TargetConfig>,
        output_fs: Arc<MemoryFs>,
    ) -> anyhow::Result<Box<dyn BuildEngine>>;
}
