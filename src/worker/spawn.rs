//! Starting worker processes.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, ChildStdin};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;

use super::protocol::{WorkerEvent, WorkerMessage};
use crate::utils::exec::Cmd;

/// Receives everything a worker reports. Called from the worker's reader thread.
pub type EventSink = Arc<dyn Fn(WorkerEvent) + Send + Sync>;

/// Handle to a running worker.
pub trait WorkerProcess: Send {
    /// Stop the worker. Its sink may still see a final `Exit`.
    fn kill(&mut self);
}

/// Starts one worker for a platform.
///
/// `spawn` is called with the adapter's lock held, so it must not invoke
/// `events` synchronously.
pub trait SpawnWorker: Send + Sync {
    fn spawn(&self, platform: &str, events: EventSink) -> Result<Box<dyn WorkerProcess>>;
}

// =============================================================================
// Child process workers
// =============================================================================

/// Runs `repack worker --platform <p>` from the current executable.
pub struct ProcessSpawner {
    program: PathBuf,
    config: PathBuf,
    root: PathBuf,
    verbose: bool,
}

impl ProcessSpawner {
    pub fn new(config: PathBuf, root: PathBuf, verbose: bool) -> Result<Self> {
        let program = std::env::current_exe().context("Failed to locate the repack executable")?;
        Ok(Self {
            program,
            config,
            root,
            verbose,
        })
    }

    fn command(&self, platform: &str) -> Cmd {
        let cmd = Cmd::new(&self.program)
            .arg("worker")
            .arg("--platform")
            .arg(platform)
            .arg("--config")
            .arg(&self.config)
            .arg("--color")
            .arg("always")
            .cwd(&self.root);
        if self.verbose { cmd.arg("--verbose") } else { cmd }
    }
}

impl SpawnWorker for ProcessSpawner {
    fn spawn(&self, platform: &str, events: EventSink) -> Result<Box<dyn WorkerProcess>> {
        let mut child = self.command(platform).spawn_piped()?;
        crate::debug!("worker"; "spawned worker for {} (pid {})", platform, child.id());

        let stdout = child.stdout.take().context("worker stdout is not piped")?;
        let stdin = child.stdin.take();
        let child = Arc::new(Mutex::new(child));

        let reader_child = Arc::clone(&child);
        thread::Builder::new()
            .name(format!("repack-worker-{platform}"))
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    match line {
                        Ok(line) if line.trim().is_empty() => {}
                        Ok(line) => match WorkerMessage::from_line(&line) {
                            Ok(message) => events(WorkerEvent::Message(message)),
                            Err(e) => events(WorkerEvent::Error(format!("invalid message: {e}"))),
                        },
                        Err(e) => {
                            events(WorkerEvent::Error(e.to_string()));
                            break;
                        }
                    }
                }
                events(WorkerEvent::Exit(wait_exit(&reader_child)));
            })
            .context("Failed to spawn worker reader thread")?;

        Ok(Box::new(ChildWorker { child, stdin }))
    }
}

/// Exit code once the process is gone. The lock is only held per poll, so
/// `kill` is never blocked behind it.
fn wait_exit(child: &Mutex<Child>) -> Option<i32> {
    loop {
        match child.lock().try_wait() {
            Ok(Some(status)) => return status.code(),
            Ok(None) => thread::sleep(Duration::from_millis(20)),
            Err(_) => return None,
        }
    }
}

struct ChildWorker {
    child: Arc<Mutex<Child>>,
    /// Dropping it tells the worker to exit
    stdin: Option<ChildStdin>,
}

impl WorkerProcess for ChildWorker {
    fn kill(&mut self) {
        self.stdin.take();
        let _ = self.child.lock().kill();
    }
}

impl Drop for ChildWorker {
    fn drop(&mut self) {
        self.kill();
    }
}
