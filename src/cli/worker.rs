//! `repack worker --platform <p>`: one platform, results on stdout.
//!
//! Runs a single-platform [`Compiler`] and reports every compilation as a
//! [`WorkerMessage`] line. Logs go to stderr. The worker exits when its
//! stdin closes (the parent went away) or when watch mode dies.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, bail};
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;

use crate::compiler::{BuildDelegate, CompiledAsset, Compiler, CompilerError, CompilerOptions};
use crate::config::ProjectConfig;
use crate::engine::command::CommandEngineFactory;
use crate::reload::message::{HmrBody, HmrMessage};
use crate::worker::{WireAsset, WorkerMessage};

enum Signal {
    Building,
    /// Body plus the assets that compilation added
    Built(Option<HmrBody>, Vec<WireAsset>),
    Failed(String),
    /// stdin reached EOF
    Detached,
}

/// Turns compiler callbacks into signals for the output loop.
///
/// Only the assets of the current compilation are forwarded; the parent
/// merges them into its own cache.
struct WorkerDelegate {
    tx: Sender<Signal>,
    emitted: Mutex<Vec<WireAsset>>,
}

impl WorkerDelegate {
    fn new(tx: Sender<Signal>) -> Self {
        Self {
            tx,
            emitted: Mutex::new(Vec::new()),
        }
    }
}

impl BuildDelegate for WorkerDelegate {
    fn notify_build_start(&self, _platform: &str) {
        let _ = self.tx.send(Signal::Building);
    }

    fn notify_build_end(&self, _platform: &str) {}

    fn notify_assets_emitted(&self, _platform: &str, assets: &[(String, CompiledAsset)]) {
        *self.emitted.lock() = assets
            .iter()
            .map(|(name, asset)| WireAsset::encode(name, asset))
            .collect();
    }

    fn broadcast_to_hmr_clients(&self, message: HmrMessage, _platform: &str) {
        if let HmrMessage::Built { body } = message {
            let assets = std::mem::take(&mut *self.emitted.lock());
            let _ = self.tx.send(Signal::Built(body, assets));
        }
    }

    fn notify_build_failed(&self, error: &CompilerError) {
        let _ = self.tx.send(Signal::Failed(error.to_string()));
    }
}

pub fn run_worker(config: Arc<ProjectConfig>, platform: &str) -> Result<()> {
    crate::logger::set_stderr(true);

    // The parent may have selected platforms on its command line
    if !config.platforms().iter().any(|p| p == platform) {
        crate::debug!("worker"; "{} is not listed in build.platforms", platform);
    }

    let (tx, rx) = channel::unbounded();
    let delegate = Arc::new(WorkerDelegate::new(tx.clone()));
    let factory = CommandEngineFactory::new(Arc::clone(&config));
    let compiler = Compiler::init(
        CompilerOptions {
            root: config.root.clone(),
            platforms: vec![platform.to_string()],
        },
        delegate,
        &factory,
    )?;

    spawn_stdin_watch(tx)?;

    let mut out = io::stdout().lock();
    if let Err(e) = compiler.start() {
        write_message(&mut out, &WorkerMessage::Failed { message: e.to_string() })?;
        return Err(e.into());
    }

    for signal in rx {
        match signal {
            Signal::Building => write_message(&mut out, &WorkerMessage::Building)?,
            Signal::Built(Some(body), assets) => {
                write_message(&mut out, &WorkerMessage::Built { body, assets })?;
            }
            Signal::Built(None, _) => {}
            Signal::Failed(message) => {
                write_message(&mut out, &WorkerMessage::Failed { message: message.clone() })?;
                compiler.close();
                bail!(message);
            }
            Signal::Detached => break,
        }
    }

    crate::debug!("worker"; "parent closed stdin, exiting");
    compiler.close();
    Ok(())
}

/// Signal [`Signal::Detached`] once stdin closes.
fn spawn_stdin_watch(tx: Sender<Signal>) -> Result<()> {
    thread::Builder::new()
        .name("repack-worker-stdin".into())
        .spawn(move || {
            let stdin = io::stdin();
            let mut line = String::new();
            while matches!(stdin.lock().read_line(&mut line), Ok(n) if n > 0) {
                line.clear();
            }
            let _ = tx.send(Signal::Detached);
        })
        .context("Failed to spawn stdin watcher")?;
    Ok(())
}

fn write_message(out: &mut impl Write, message: &WorkerMessage) -> Result<()> {
    let line = message.to_line()?;
    writeln!(out, "{line}").context("Failed to write to parent")?;
    out.flush().context("Failed to write to parent")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_message() {
        let mut out = Vec::new();
        write_message(&mut out, &WorkerMessage::Building).unwrap();
        write_message(&mut out, &WorkerMessage::Failed { message: "x".into() }).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"type\":\"building\"}\n{\"type\":\"failed\",\"message\":\"x\"}\n"
        );
    }

    #[test]
    fn test_delegate_signals() {
        let (tx, rx) = channel::unbounded();
        let delegate = WorkerDelegate::new(tx);

        delegate.notify_build_start("ios");
        delegate.broadcast_to_hmr_clients(HmrMessage::building(), "ios");
        delegate.notify_build_end("ios");
        delegate.broadcast_to_hmr_clients(HmrMessage::built(None), "ios");

        let signals: Vec<_> = rx.try_iter().collect();
        assert_eq!(signals.len(), 2);
        assert!(matches!(signals[0], Signal::Building));
        assert!(matches!(&signals[1], Signal::Built(None, assets) if assets.is_empty()));
    }

    #[test]
    fn test_built_carries_only_emitted_assets() {
        let (tx, rx) = channel::unbounded();
        let delegate = WorkerDelegate::new(tx);
        let asset = |data: &str| CompiledAsset::new(data.as_bytes().to_vec(), Default::default());
        let body = || {
            Some(HmrBody {
                name: "ios".into(),
                time: 1,
                hash: "h".into(),
                warnings: vec![],
                errors: vec![],
            })
        };

        delegate.notify_assets_emitted("ios", &[("index.bundle".into(), asset("v1"))]);
        delegate.broadcast_to_hmr_clients(HmrMessage::built(body()), "ios");
        delegate.notify_assets_emitted("ios", &[("logo.png".into(), asset("png"))]);
        delegate.broadcast_to_hmr_clients(HmrMessage::built(body()), "ios");
        // Nothing emitted since the last broadcast
        delegate.broadcast_to_hmr_clients(HmrMessage::built(body()), "ios");

        let names: Vec<Vec<String>> = rx
            .try_iter()
            .map(|signal| match signal {
                Signal::Built(_, assets) => assets.into_iter().map(|a| a.name).collect(),
                _ => panic!("expected a built signal"),
            })
            .collect();
        assert_eq!(names, vec![vec!["index.bundle"], vec!["logo.png"], vec![]]);
    }
}
