//! Command build engine.
//!
//! Builds every target by running an external bundler command, then ingests
//! what the command wrote into the shared [`MemoryFs`].
//!
//! ```text
//! watch() ──► watcher attached (events buffer from here on)
//!         └─► thread: watch_run → build_all → done
//!                     loop { notify event → Debouncer
//!                            quiet period → invalid → build_all → done
//!                            shutdown → exit }
//! ```
//!
//! The watcher is created before the initial build so no change made while
//! the first compilation runs is lost.

mod build;
mod debouncer;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Result;
use crossbeam::channel::{self, Receiver, Sender};
use notify::{RecursiveMode, Watcher};
use rayon::prelude::*;

use super::{
    BuildEngine, BuildError, BuildObserver, ChildStats, EngineFactory, FatalHandler, MemoryFs,
    MultiStats, TargetConfig, WatchOptions,
};
use crate::config::ProjectConfig;
use debouncer::Debouncer;

/// Engine running one bundler command per target.
pub struct CommandEngine {
    root: PathBuf,
    targets: Arc<Vec<TargetConfig>>,
    output_fs: Arc<MemoryFs>,
    observers: Vec<Arc<dyn BuildObserver>>,
    shutdown_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CommandEngine {
    pub fn new(root: PathBuf, targets: Vec<TargetConfig>, output_fs: Arc<MemoryFs>) -> Self {
        Self {
            root,
            targets: Arc::new(targets),
            output_fs,
            observers: Vec::new(),
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Run a single build of every target without watching.
    #[cfg(test)]
    pub fn run(&self) -> MultiStats {
        build_all(&self.root, &self.targets, &self.output_fs)
    }
}

impl BuildEngine for CommandEngine {
    fn subscribe(&mut self, observer: Arc<dyn BuildObserver>) {
        self.observers.push(observer);
    }

    fn watch(&mut self, options: WatchOptions, on_fatal: FatalHandler) -> Result<(), BuildError> {
        self.close();

        let (event_tx, event_rx) = channel::unbounded();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = event_tx.send(res);
        })
        .map_err(|e| watch_error(&self.root, e))?;

        for root in &options.roots {
            if !root.exists() {
                crate::log!("watch"; "skipping missing watch root {}", root.display());
                continue;
            }
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| watch_error(root, e))?;
        }

        let (shutdown_tx, shutdown_rx) = channel::bounded(1);
        let session = WatchSession {
            root: self.root.clone(),
            targets: Arc::clone(&self.targets),
            output_fs: Arc::clone(&self.output_fs),
            observers: self.observers.clone(),
            debouncer: Debouncer::new(options.aggregate_timeout, options.ignored),
            on_fatal,
        };

        let handle = std::thread::Builder::new()
            .name("repack-watch".into())
            .spawn(move || session.run(watcher, event_rx, shutdown_rx))
            .map_err(|e| BuildError::Engine(format!("failed to spawn watch thread: {e}")))?;

        self.shutdown_tx = Some(shutdown_tx);
        self.handle = Some(handle);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            crate::log!("watch"; "watch thread panicked");
        }
    }
}

impl Drop for CommandEngine {
    fn drop(&mut self) {
        self.close();
    }
}

fn watch_error(path: &Path, e: notify::Error) -> BuildError {
    BuildError::Watch {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// State moved onto the watch thread.
struct WatchSession {
    root: PathBuf,
    targets: Arc<Vec<TargetConfig>>,
    output_fs: Arc<MemoryFs>,
    observers: Vec<Arc<dyn BuildObserver>>,
    debouncer: Debouncer,
    on_fatal: FatalHandler,
}

impl WatchSession {
    fn run(
        mut self,
        // Kept alive for the lifetime of the loop
        _watcher: notify::RecommendedWatcher,
        events: Receiver<notify::Result<notify::Event>>,
        shutdown: Receiver<()>,
    ) {
        self.observers.iter().for_each(|o| o.watch_run());
        self.compile();

        loop {
            crossbeam::select! {
                recv(events) -> msg => match msg {
                    Ok(Ok(event)) => self.debouncer.add_event(&event),
                    Ok(Err(e)) => {
                        (self.on_fatal)(watch_error(&self.root, e));
                        break;
                    }
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
                default(self.debouncer.sleep_duration()) => {
                    let Some(changes) = self.debouncer.take_if_ready() else {
                        continue;
                    };
                    crate::debug!("watch"; "{} file(s) changed", changes.len());
                    self.observers.iter().for_each(|o| o.invalid());
                    self.compile();
                }
            }
        }
    }

    fn compile(&self) {
        let stats = build_all(&self.root, &self.targets, &self.output_fs);
        self.observers.iter().for_each(|o| o.done(&stats));
    }
}

/// Build all targets in parallel, keeping target order in the result.
fn build_all(root: &Path, targets: &[TargetConfig], output_fs: &MemoryFs) -> MultiStats {
    let children: Vec<ChildStats> = targets
        .par_iter()
        .map(|target| build::build_target(root, target, output_fs))
        .collect();
    MultiStats { children }
}

// =============================================================================
// Factory
// =============================================================================

/// Creates [`CommandEngine`]s from `repack.toml`.
pub struct CommandEngineFactory {
    config: Arc<ProjectConfig>,
}

impl CommandEngineFactory {
    pub fn new(config: Arc<ProjectConfig>) -> Self {
        Self { config }
    }
}

impl EngineFactory for CommandEngineFactory {
    fn load_target(&self, platform: &str) -> Result<TargetConfig> {
        let config = &self.config;
        let build = &config.build;
        let overrides = config.targets.get(platform);

        let command = overrides
            .and_then(|t| t.command.clone())
            .unwrap_or_else(|| build.command.clone());
        if command.is_empty() {
            anyhow::bail!("empty build command for platform `{platform}`");
        }

        let env = overrides
            .map(|t| t.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        let mut ignored = build.ignored.clone();
        if !ignored.iter().any(|i| i == ".repack") {
            ignored.push(".repack".into());
        }

        Ok(TargetConfig {
            name: platform.to_string(),
            command,
            env,
            output_path: config.root.join(&build.output).join(platform),
            watch_options: WatchOptions {
                aggregate_timeout: std::time::Duration::from_millis(build.aggregate_timeout),
                roots: build.watch.iter().map(|dir| config.root.join(dir)).collect(),
                ignored,
            },
        })
    }

    fn create(
        &self,
        targets: Vec<TargetConfig>,
        output_fs: Arc<MemoryFs>,
    ) -> Result<Box<dyn BuildEngine>> {
        Ok(Box::new(CommandEngine::new(
            self.config.root.clone(),
            targets,
            output_fs,
        )))
    }
}
