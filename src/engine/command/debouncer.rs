use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;

/// Pure debouncer: collects changed paths until the aggregate timeout has
/// passed without new events.
pub(super) struct Debouncer {
    changes: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
    timeout: Duration,
    ignored: Vec<String>,
}

impl Debouncer {
    pub(super) fn new(timeout: Duration, ignored: Vec<String>) -> Self {
        Self {
            changes: FxHashSet::default(),
            last_event: None,
            timeout,
            ignored,
        }
    }

    /// Add a notify event. Metadata-only changes, editor temp files and
    /// ignored paths are dropped.
    pub(super) fn add_event(&mut self, event: &notify::Event) {
        use notify::EventKind;

        match event.kind {
            EventKind::Create(_) | EventKind::Remove(_) => {}
            EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => return,
            EventKind::Modify(_) => {}
            _ => return,
        }

        for path in &event.paths {
            if is_temp_file(path) || self.is_ignored(path) {
                continue;
            }
            crate::debug!("watch"; "{:?}: {}", event.kind, path.display());
            self.changes.insert(path.clone());
            self.last_event = Some(Instant::now());
        }
    }

    /// Take collected changes once the quiet period has elapsed.
    pub(super) fn take_if_ready(&mut self) -> Option<Vec<PathBuf>> {
        let last_event = self.last_event?;
        if last_event.elapsed() < self.timeout || self.changes.is_empty() {
            return None;
        }

        self.last_event = None;
        let mut changes: Vec<_> = self.changes.drain().collect();
        changes.sort();
        Some(changes)
    }

    /// Sleep duration until the batch could become ready.
    pub(super) fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_millis(500);
        };

        self.timeout
            .saturating_sub(last_event.elapsed())
            .max(Duration::from_millis(1))
    }

    fn is_ignored(&self, path: &Path) -> bool {
        path.components().any(|component| match component {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                self.ignored.iter().any(|ignored| ignored.as_str() == name)
            }
            _ => false,
        })
    }
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with(".#")
}
