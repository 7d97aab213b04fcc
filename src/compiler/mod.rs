//! Compiler orchestration.
//!
//! Drives one multi-target [`BuildEngine`] (one target per platform) in watch
//! mode and keeps a per-platform asset cache in sync with it.
//!
//! ```text
//!                watch_run / invalid          done(MultiStats)
//! BuildEngine ─────────────────────► Hooks ◄──────────────────── BuildEngine
//!                 in_progress = true   │  snapshot stats, materialize assets from MemoryFs,
//!                 build start          │  merge into AssetCache, in_progress = false,
//!                                      │  drain PendingWaiters, build end, HMR built
//!                                      ▼
//! get_asset(f, p) ── cache hit ──► asset
//!                 ── miss, idle ──► NotFound
//!                 ── miss, compiling ──► Waiter (resolved by the next done)
//! ```
//!
//! All state lives behind one lock. A `done` hook updates every platform's
//! cache before any waiter is released, so readers see either the previous
//! or the new asset set of a platform, never a mix. Delegate calls are made
//! after the lock is released.

pub mod asset;
pub mod delegate;
pub mod error;
pub mod pending;
pub mod source;
mod stats;

#[cfg(test)]
mod tests;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;

use crate::engine::{
    AssetKind, BuildEngine, BuildObserver, ChildStats, Diagnostic, EngineFactory, FatalHandler, MemoryFs,
    MultiStats, WatchOptions,
};
use crate::reload::message::{HmrBody, HmrMessage};

pub use asset::{AssetCache, CompiledAsset};
pub use delegate::BuildDelegate;
pub use error::CompilerError;
pub use pending::{AssetResult, PendingWaiters, Settlement, Waiter};
pub use source::AssetSource;
pub use stats::StatsSnapshot;

/// What to build and where raw sources live.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    pub root: PathBuf,
    pub platforms: Vec<String>,
}

// =============================================================================
// Shared state + lifecycle hooks
// =============================================================================

#[derive(Default)]
struct State {
    assets: AssetCache,
    stats: FxHashMap<String, StatsSnapshot>,
    pending: PendingWaiters,
    /// One flag for all platforms
    in_progress: bool,
}

/// Outcome of an asset lookup, decided synchronously.
enum Lookup {
    Ready(AssetResult),
    Pending(oneshot::Receiver<AssetResult>),
}

/// Observer registered on the build engine.
struct Hooks {
    platforms: Vec<String>,
    state: Mutex<State>,
    delegate: Arc<dyn BuildDelegate>,
    filesystem: Arc<MemoryFs>,
}

impl Hooks {
    fn building(&self, broadcast: bool) {
        self.state.lock().in_progress = true;

        // Every platform is reported, even the ones the change did not touch
        for platform in &self.platforms {
            self.delegate.notify_build_start(platform);
            if broadcast {
                self.delegate
                    .broadcast_to_hmr_clients(HmrMessage::building(), platform);
            }
        }
    }

    fn request(&self, filename: &str, platform: &str) -> Lookup {
        if !self.platforms.iter().any(|p| p == platform) {
            return Lookup::Ready(Err(CompilerError::UnknownPlatform(platform.to_string())));
        }

        let filename = asset::normalize_name(filename);
        let mut state = self.state.lock();

        if let Some(asset) = state.assets.get(platform, &filename) {
            return Lookup::Ready(Ok(asset.clone()));
        }

        if !state.in_progress {
            return Lookup::Ready(Err(CompilerError::NotFound {
                filename,
                platform: platform.to_string(),
            }));
        }

        let (waiter, rx) = Waiter::new(filename);
        state.pending.register(platform, waiter);
        Lookup::Pending(rx)
    }

    /// Reject every pending request of every platform with `error`.
    fn fail_all(&self, error: &CompilerError) {
        let drained = {
            let mut state = self.state.lock();
            state.in_progress = false;
            state.pending.drain_all()
        };

        for (platform, waiters) in drained {
            crate::debug!("build"; "failing {} request(s) for {}", waiters.len(), platform);
            for waiter in waiters {
                waiter.resolve(Err(error.clone()));
            }
        }
    }

    fn hmr_body(&self, platform: &str) -> Option<HmrBody> {
        self.state.lock().stats.get(platform).map(HmrBody::from)
    }
}

/// Read the servable outputs of one target back from the memory filesystem.
fn materialize(fs: &MemoryFs, child: &ChildStats) -> Result<Vec<(String, CompiledAsset)>, String> {
    child
        .assets
        .iter()
        .filter(|asset| asset.kind == AssetKind::Asset)
        .map(|asset| {
            let path = child.output_path.join(&asset.name);
            let data = fs
                .read(&path)
                .map_err(|e| format!("{}: {e}", asset.name))?;
            let compiled = CompiledAsset {
                data,
                info: asset.info.clone(),
                size: asset.size,
            };
            Ok((asset.name.clone(), compiled))
        })
        .collect()
}

impl BuildObserver for Hooks {
    fn watch_run(&self) {
        self.building(false);
    }

    fn invalid(&self) {
        self.building(true);
    }

    fn done(&self, stats: &MultiStats) {
        let mut resolved = Vec::with_capacity(self.platforms.len());

        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let mut failures: FxHashMap<&str, CompilerError> = FxHashMap::default();
            let mut emitted: FxHashMap<&str, Vec<(String, CompiledAsset)>> = FxHashMap::default();

            for child in &stats.children {
                let platform = child.name.as_str();
                if !self.platforms.iter().any(|p| p == platform) {
                    crate::debug!("build"; "ignoring stats of unknown target {}", platform);
                    continue;
                }

                let mut snapshot = StatsSnapshot::from(child);

                match materialize(&self.filesystem, child) {
                    Ok(fresh) => {
                        state.assets.merge(platform, fresh.iter().cloned());
                        emitted.insert(platform, fresh);
                    }
                    Err(message) => {
                        crate::log!("error"; "failed to read assets of {}: {}", platform, message);
                        snapshot.errors.push(Diagnostic::new(&message));
                        failures.insert(
                            platform,
                            CompilerError::Materialize {
                                platform: platform.to_string(),
                                message,
                            },
                        );
                    }
                }
                state.stats.insert(platform.to_string(), snapshot);
            }

            state.in_progress = false;

            for platform in &self.platforms {
                let errors = stats
                    .children
                    .iter()
                    .find(|c| &c.name == platform)
                    .map(|c| c.errors.as_slice())
                    .unwrap_or_default();

                let waiters = Settlement {
                    platform,
                    assets: &state.assets,
                    errors,
                    failure: failures.get(platform.as_str()),
                }
                .settle(state.pending.drain(platform));

                let body = state.stats.get(platform).map(HmrBody::from);
                let fresh = emitted.remove(platform.as_str()).unwrap_or_default();
                resolved.push((platform, waiters, body, fresh));
            }
        }

        for (platform, waiters, body, fresh) in resolved {
            for (waiter, result) in waiters {
                waiter.resolve(result);
            }
            self.delegate.notify_build_end(platform);
            self.delegate.notify_assets_emitted(platform, &fresh);
            self.delegate
                .broadcast_to_hmr_clients(HmrMessage::built(body), platform);
        }
    }
}

// =============================================================================
// Compiler
// =============================================================================

/// In-process orchestrator over a multi-target build engine.
pub struct Compiler {
    root: PathBuf,
    hooks: Arc<Hooks>,
    engine: Mutex<Box<dyn BuildEngine>>,
    watch_options: WatchOptions,
}

impl Compiler {
    /// Load one target per platform and construct the engine.
    ///
    /// Nothing is compiled until [`Compiler::start`].
    pub fn init(
        options: CompilerOptions,
        delegate: Arc<dyn BuildDelegate>,
        factory: &dyn EngineFactory,
    ) -> Result<Self> {
        if options.platforms.is_empty() {
            anyhow::bail!("no platforms to compile");
        }

        let targets = options
            .platforms
            .iter()
            .map(|platform| {
                let mut target = factory
                    .load_target(platform)
                    .with_context(|| format!("Failed to load build config for {platform}"))?;
                target.name = platform.clone();
                Ok(target)
            })
            .collect::<Result<Vec<_>>>()?;

        let watch_options = targets
            .first()
            .map(|t| t.watch_options.clone())
            .unwrap_or_default();

        let filesystem = Arc::new(MemoryFs::new());
        let mut engine = factory.create(targets, Arc::clone(&filesystem))?;

        let hooks = Arc::new(Hooks {
            platforms: options.platforms,
            state: Mutex::new(State::default()),
            delegate,
            filesystem,
        });
        engine.subscribe(Arc::clone(&hooks) as Arc<dyn BuildObserver>);

        Ok(Self {
            root: options.root,
            hooks,
            engine: Mutex::new(engine),
            watch_options,
        })
    }

    /// Start watch mode.
    ///
    /// Requests made from here on wait for the first compilation. A fatal
    /// watch error rejects every pending request; `start` may be called
    /// again afterwards.
    pub fn start(&self) -> Result<(), CompilerError> {
        crate::log!("build"; "starting build for {}", self.hooks.platforms.join(", "));
        self.hooks.state.lock().in_progress = true;

        let hooks = Arc::clone(&self.hooks);
        let on_fatal: FatalHandler = Box::new(move |error| {
            let error = CompilerError::Build(error);
            crate::log!("error"; "{}", error);
            hooks.fail_all(&error);
            hooks.delegate.notify_build_failed(&error);
        });

        let result = self
            .engine
            .lock()
            .watch(self.watch_options.clone(), on_fatal);

        result.map_err(|e| {
            let error = CompilerError::Build(e);
            self.hooks.fail_all(&error);
            error
        })
    }

    /// Stop watch mode.
    pub fn close(&self) {
        self.engine.lock().close();
    }

    #[cfg(test)]
    pub fn is_compiling(&self) -> bool {
        self.hooks.state.lock().in_progress
    }

    /// Snapshot of a platform's cached assets.
    #[cfg(test)]
    pub fn assets(&self, platform: &str) -> Vec<(String, CompiledAsset)> {
        self.hooks.state.lock().assets.assets(platform)
    }
}

impl AssetSource for Compiler {
    fn root(&self) -> &Path {
        &self.root
    }

    fn get_asset(&self, filename: &str, platform: &str) -> impl Future<Output = AssetResult> + Send {
        // Registered now, so a `done` firing before the first poll is not missed
        let lookup = self.hooks.request(filename, platform);
        let (filename, platform) = (filename.to_string(), platform.to_string());

        async move {
            match lookup {
                Lookup::Ready(result) => result,
                Lookup::Pending(rx) => rx
                    .await
                    .unwrap_or(Err(CompilerError::Abandoned { filename, platform })),
            }
        }
    }

    fn get_hmr_body(&self, platform: &str) -> Option<HmrBody> {
        self.hooks.hmr_body(platform)
    }
}
