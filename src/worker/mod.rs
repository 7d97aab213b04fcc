//! Out-of-process compilation.
//!
//! [`WorkerAdapter`] serves the same requests as the in-process
//! [`Compiler`](crate::compiler::Compiler), but every platform builds in its
//! own `repack worker` process. Nothing is shared with a worker: assets and
//! stats arrive as [`WorkerMessage`]s and are kept in a local cache.
//!
//! ```text
//! get_asset(f, p) ──► spawn worker p (first request, or previous one died)
//!                 ──► cache hit ─────────────► asset
//!                 ──► miss, building ────────► Waiter
//!                 ──► miss, idle ────────────► NotFound
//!
//! worker p stdout:  building ──► build start, HMR building
//!                   built    ──► merge cache, drain waiters, build end, HMR built
//!                   failed / exit / garbage ──► reject every waiter of p
//! ```
//!
//! A crashed worker only affects its own platform.

pub mod protocol;
pub mod spawn;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;

use crate::compiler::{
    AssetCache, AssetResult, AssetSource, BuildDelegate, CompilerError, PendingWaiters,
    Settlement, Waiter, asset::normalize_name,
};
use crate::reload::message::{HmrBody, HmrMessage};

pub use protocol::{WireAsset, WorkerEvent, WorkerMessage};
pub use spawn::{EventSink, ProcessSpawner, SpawnWorker, WorkerProcess};

struct Running {
    /// Distinguishes this worker's events from those of a dead predecessor
    generation: u64,
    process: Box<dyn WorkerProcess>,
}

#[derive(Default)]
struct Slot {
    worker: Option<Running>,
    in_progress: bool,
    body: Option<HmrBody>,
}

impl Slot {
    fn retire(&mut self) {
        if let Some(mut running) = self.worker.take() {
            running.process.kill();
        }
        self.in_progress = false;
    }
}

#[derive(Default)]
struct State {
    assets: AssetCache,
    pending: PendingWaiters,
    slots: FxHashMap<String, Slot>,
    next_generation: u64,
}

impl State {
    /// The platform's slot, if `generation` is still its live worker.
    fn current(&mut self, platform: &str, generation: u64) -> Option<&mut Slot> {
        let slot = self.slots.get_mut(platform)?;
        let live = slot.worker.as_ref().map(|w| w.generation);
        if live == Some(generation) {
            Some(slot)
        } else {
            crate::debug!("worker"; "ignoring event of retired worker {} for {}", generation, platform);
            None
        }
    }
}

enum Lookup {
    Ready(AssetResult),
    Pending(oneshot::Receiver<AssetResult>),
}

struct Inner {
    root: PathBuf,
    platforms: Vec<String>,
    delegate: Arc<dyn BuildDelegate>,
    spawner: Box<dyn SpawnWorker>,
    state: Mutex<State>,
}

impl Inner {
    fn request(self: &Arc<Self>, filename: &str, platform: &str) -> Lookup {
        if !self.platforms.iter().any(|p| p == platform) {
            return Lookup::Ready(Err(CompilerError::UnknownPlatform(platform.to_string())));
        }

        let filename = normalize_name(filename);
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let spawned = self.ensure_worker(state, platform);

        // Cached assets outlive a worker that cannot be restarted
        if let Some(asset) = state.assets.get(platform, &filename) {
            return Lookup::Ready(Ok(asset.clone()));
        }
        if let Err(e) = spawned {
            return Lookup::Ready(Err(e));
        }

        if !state.slots.get(platform).is_some_and(|s| s.in_progress) {
            return Lookup::Ready(Err(CompilerError::NotFound {
                filename,
                platform: platform.to_string(),
            }));
        }

        let (waiter, rx) = Waiter::new(filename);
        state.pending.register(platform, waiter);
        Lookup::Pending(rx)
    }

    /// Spawn the platform's worker unless one is alive.
    fn ensure_worker(self: &Arc<Self>, state: &mut State, platform: &str) -> Result<(), CompilerError> {
        let slot = state.slots.entry(platform.to_string()).or_default();
        if slot.worker.is_some() {
            return Ok(());
        }

        let generation = state.next_generation;
        state.next_generation += 1;

        let weak: Weak<Self> = Arc::downgrade(self);
        let owner = platform.to_string();
        let events: EventSink = Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.handle(&owner, generation, event);
            }
        });

        let process = self.spawner.spawn(platform, events).map_err(|e| {
            crate::log!("error"; "failed to start worker for {}: {:#}", platform, e);
            CompilerError::Worker {
                platform: platform.to_string(),
                message: format!("{e:#}"),
            }
        })?;

        crate::log!("worker"; "started worker for {}", platform);
        slot.worker = Some(Running {
            generation,
            process,
        });
        // A fresh worker always starts with a build
        slot.in_progress = true;
        Ok(())
    }

    fn handle(&self, platform: &str, generation: u64, event: WorkerEvent) {
        match event {
            WorkerEvent::Message(WorkerMessage::Building) => self.building(platform, generation),
            WorkerEvent::Message(WorkerMessage::Built { body, assets }) => {
                self.built(platform, generation, body, assets)
            }
            WorkerEvent::Message(WorkerMessage::Failed { message }) | WorkerEvent::Error(message) => {
                let error = CompilerError::Worker {
                    platform: platform.to_string(),
                    message,
                };
                self.fail(platform, generation, error);
            }
            WorkerEvent::Exit(code) => {
                let error = CompilerError::WorkerExited {
                    platform: platform.to_string(),
                    code,
                };
                self.fail(platform, generation, error);
            }
        }
    }

    fn building(&self, platform: &str, generation: u64) {
        match self.state.lock().current(platform, generation) {
            Some(slot) => slot.in_progress = true,
            None => return,
        }
        self.delegate.notify_build_start(platform);
        self.delegate
            .broadcast_to_hmr_clients(HmrMessage::building(), platform);
    }

    fn built(&self, platform: &str, generation: u64, body: HmrBody, assets: Vec<WireAsset>) {
        let waiters = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            match state.current(platform, generation) {
                Some(slot) => {
                    slot.in_progress = false;
                    slot.body = Some(body.clone());
                }
                None => return,
            }

            let decoded = assets
                .into_iter()
                .map(WireAsset::decode)
                .collect::<Result<Vec<_>, _>>();

            let failure = match decoded {
                Ok(fresh) => {
                    state.assets.merge(platform, fresh);
                    None
                }
                Err(e) => {
                    crate::log!("error"; "worker for {} sent an unreadable asset: {}", platform, e);
                    Some(CompilerError::Materialize {
                        platform: platform.to_string(),
                        message: e.to_string(),
                    })
                }
            };

            Settlement {
                platform,
                assets: &state.assets,
                errors: &body.errors,
                failure: failure.as_ref(),
            }
            .settle(state.pending.drain(platform))
        };

        for (waiter, result) in waiters {
            waiter.resolve(result);
        }
        self.delegate.notify_build_end(platform);
        self.delegate
            .broadcast_to_hmr_clients(HmrMessage::built(Some(body)), platform);
    }

    /// Retire the platform's worker and reject its waiters.
    fn fail(&self, platform: &str, generation: u64, error: CompilerError) {
        let waiters = {
            let mut state = self.state.lock();
            match state.current(platform, generation) {
                Some(slot) => slot.retire(),
                None => return,
            }
            state.pending.drain(platform)
        };

        crate::log!("error"; "{}", error);

        for waiter in waiters {
            waiter.resolve(Err(error.clone()));
        }
        self.delegate.notify_build_failed(&error);
    }
}

/// [`AssetSource`] backed by one worker process per platform.
pub struct WorkerAdapter {
    inner: Arc<Inner>,
}

impl WorkerAdapter {
    pub fn new(
        root: PathBuf,
        platforms: Vec<String>,
        delegate: Arc<dyn BuildDelegate>,
        spawner: Box<dyn SpawnWorker>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                root,
                platforms,
                delegate,
                spawner,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn platforms(&self) -> &[String] {
        &self.inner.platforms
    }

    /// Whether the platform's worker is alive.
    #[cfg(test)]
    pub fn is_running(&self, platform: &str) -> bool {
        self.inner
            .state
            .lock()
            .slots
            .get(platform)
            .is_some_and(|s| s.worker.is_some())
    }

    /// Stop every worker. Pending requests are rejected.
    pub fn close(&self) {
        let drained = {
            let mut state = self.inner.state.lock();
            state.slots.values_mut().for_each(Slot::retire);
            state.pending.drain_all()
        };

        for (platform, waiters) in drained {
            let error = CompilerError::WorkerExited {
                platform,
                code: None,
            };
            for waiter in waiters {
                waiter.resolve(Err(error.clone()));
            }
        }
    }
}

impl Drop for WorkerAdapter {
    fn drop(&mut self) {
        self.close();
    }
}

impl AssetSource for WorkerAdapter {
    fn root(&self) -> &Path {
        &self.inner.root
    }

    fn get_asset(&self, filename: &str, platform: &str) -> impl Future<Output = AssetResult> + Send {
        let lookup = self.inner.request(filename, platform);
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
        self.inner
            .state
            .lock()
            .slots
            .get(platform)
            .and_then(|s| s.body.clone())
    }
}
