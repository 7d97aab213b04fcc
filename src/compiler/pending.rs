//! Requests waiting for the next compilation of their platform.
//!
//! A waiter is registered while a compilation is in flight and resolved
//! exactly once, when the compilation finishes (or the watcher dies).
//! Draining hands out the waiters in registration order.

use std::mem;

use rustc_hash::FxHashMap;
use tokio::sync::oneshot;

use super::asset::{AssetCache, CompiledAsset};
use super::error::CompilerError;
use crate::engine::Diagnostic;

pub type AssetResult = Result<CompiledAsset, CompilerError>;

/// A deferred `get_asset` call.
#[derive(Debug)]
pub struct Waiter {
    filename: String,
    tx: oneshot::Sender<AssetResult>,
}

impl Waiter {
    pub fn new(filename: impl Into<String>) -> (Self, oneshot::Receiver<AssetResult>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                filename: filename.into(),
                tx,
            },
            rx,
        )
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Deliver the result. A dropped receiver (caller gave up) is ignored.
    pub fn resolve(self, result: AssetResult) {
        let _ = self.tx.send(result);
    }
}

/// Platform → waiters in registration order.
#[derive(Debug, Default)]
pub struct PendingWaiters {
    waiters: FxHashMap<String, Vec<Waiter>>,
}

impl PendingWaiters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, platform: &str, waiter: Waiter) {
        self.waiters.entry(platform.to_string()).or_default().push(waiter);
    }

    /// Take every waiter of a platform, oldest first.
    pub fn drain(&mut self, platform: &str) -> Vec<Waiter> {
        self.waiters
            .get_mut(platform)
            .map(mem::take)
            .unwrap_or_default()
    }

    /// Take every waiter of every platform.
    pub fn drain_all(&mut self) -> Vec<(String, Vec<Waiter>)> {
        self.waiters
            .drain()
            .filter(|(_, waiters)| !waiters.is_empty())
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self, platform: &str) -> usize {
        self.waiters.get(platform).map_or(0, Vec::len)
    }
}

/// Outcome of one finished compilation, used to answer its waiters.
pub struct Settlement<'a> {
    pub platform: &'a str,
    pub assets: &'a AssetCache,
    /// Compilation errors reported by the build
    pub errors: &'a [Diagnostic],
    /// Set when the compilation's assets could not be taken in
    pub failure: Option<&'a CompilerError>,
}

impl Settlement<'_> {
    /// Pair every waiter with its result, keeping their order.
    ///
    /// A failure wins over compile errors, which win over the cache lookup.
    pub fn settle(&self, waiters: Vec<Waiter>) -> Vec<(Waiter, AssetResult)> {
        waiters
            .into_iter()
            .map(|waiter| {
                let result = self.result_for(waiter.filename());
                (waiter, result)
            })
            .collect()
    }

    fn result_for(&self, filename: &str) -> AssetResult {
        if let Some(failure) = self.failure {
            return Err(failure.clone());
        }
        if !self.errors.is_empty() {
            return Err(CompilerError::CompilationFailed {
                platform: self.platform.to_string(),
                errors: self.errors.to_vec(),
            });
        }
        self.assets
            .get(self.platform, filename)
            .cloned()
            .ok_or_else(|| CompilerError::NotFoundAfterCompilation {
                filename: filename.to_string(),
                platform: self.platform.to_string(),
            })
    }
}
