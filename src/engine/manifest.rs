//! Chunk manifest contract.
//!
//! Every chunk with at least one emitted file gets a JSON manifest next to
//! it, named after the chunk's **first** emitted file plus `.json`:
//!
//! ```text
//! src_screens_Home_tsx.chunk.bundle       <- files[0]
//! src_screens_Home_tsx.chunk.bundle.json  <- manifest
//! ```
//!
//! ```json
//! { "id": "src_screens_Home_tsx", "name": "Home",
//!   "files": ["src_screens_Home_tsx.chunk.bundle"],
//!   "auxiliaryFiles": ["src_screens_Home_tsx.chunk.bundle.map"] }
//! ```
//!
//! Native runtimes resolve chunk loading through this file. The manifest
//! lists the auxiliary files as they were before the manifest itself was
//! added to them.

use serde::{Deserialize, Serialize};

/// Suffix appended to the first chunk file to name its manifest.
pub const MANIFEST_SUFFIX: &str = ".json";

/// A chunk as produced by the bundler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub name: Option<String>,
    pub files: Vec<String>,
    pub auxiliary_files: Vec<String>,
}

/// Serialized manifest content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkManifest {
    pub id: String,
    pub name: Option<String>,
    pub files: Vec<String>,
    pub auxiliary_files: Vec<String>,
}

impl From<&Chunk> for ChunkManifest {
    fn from(chunk: &Chunk) -> Self {
        Self {
            id: chunk.id.clone(),
            name: chunk.name.clone(),
            files: chunk.files.clone(),
            auxiliary_files: chunk.auxiliary_files.clone(),
        }
    }
}

/// Manifest filename for a chunk, `None` when the chunk emitted nothing.
pub fn manifest_filename(chunk: &Chunk) -> Option<String> {
    chunk
        .files
        .first()
        .map(|first| format!("{first}{MANIFEST_SUFFIX}"))
}

/// Build the manifest of `chunk` and register it as an auxiliary file.
///
/// Returns the manifest filename and its JSON content.
pub fn emit(chunk: &mut Chunk) -> Option<(String, Vec<u8>)> {
    let filename = manifest_filename(chunk)?;
    let manifest = ChunkManifest::from(&*chunk);
    chunk.auxiliary_files.push(filename.clone());

    let content = serde_json::to_vec(&manifest).ok()?;
    Some((filename, content))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk() -> Chunk {
        Chunk {
            id: "home".into(),
            name: Some("Home".into()),
            files: vec!["home.chunk.bundle".into(), "home.css".into()],
            auxiliary_files: vec!["home.chunk.bundle.map".into()],
        }
    }

    #[test]
    fn test_manifest_named_after_first_file() {
        assert_eq!(
            manifest_filename(&chunk()).as_deref(),
            Some("home.chunk.bundle.json")
        );
    }

    #[test]
    fn test_emit_content() {
        let mut chunk = chunk();
        let (filename, content) = emit(&mut chunk).unwrap();

        assert_eq!(filename, "home.chunk.bundle.json");
        let manifest: serde_json::Value = serde_json::from_slice(&content).unwrap();
        assert_eq!(manifest["id"], "home");
        assert_eq!(manifest["name"], "Home");
        assert_eq!(manifest["files"][0], "home.chunk.bundle");
        // The manifest does not list itself
        assert_eq!(
            manifest["auxiliaryFiles"],
            serde_json::json!(["home.chunk.bundle.map"])
        );
        assert_eq!(chunk.auxiliary_files.last().unwrap(), "home.chunk.bundle.json");
    }

    #[test]
    fn test_empty_chunk_has_no_manifest() {
        let mut chunk = Chunk {
            id: "empty".into(),
            ..Default::default()
        };
        assert!(emit(&mut chunk).is_none());
        assert!(chunk.auxiliary_files.is_empty());
    }
}
