//! In-memory output filesystem.
//!
//! Build engines write their outputs here instead of to disk, and the
//! orchestrator reads them back synchronously in the `done` hook.
//! Paths are keyed with `/` separators so Windows-style output paths resolve
//! to the same entry.

use std::io;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;

/// Concurrent path -> bytes map.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: DashMap<String, Arc<[u8]>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write (or overwrite) a file.
    pub fn write(&self, path: &Path, data: impl Into<Arc<[u8]>>) {
        self.files.insert(key(path), data.into());
    }

    /// Read a file.
    pub fn read(&self, path: &Path) -> io::Result<Arc<[u8]>> {
        self.files
            .get(&key(path))
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no such file in memory filesystem: {}", path.display()),
                )
            })
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(&key(path))
    }

    /// Remove every file below `dir`. Returns the number of removed files.
    pub fn remove_dir(&self, dir: &Path) -> usize {
        let prefix = format!("{}/", key(dir));
        let before = self.files.len();
        self.files.retain(|path, _| !path.starts_with(&prefix));
        before - self.files.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.files.len()
    }
}

fn key(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    raw.trim_end_matches('/').to_string()
}
