//! Errors delivered to asset requests.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::engine::{BuildError, Diagnostic};

/// Why an asset request failed.
///
/// `Clone` so one failure can be handed to every waiter of a compilation.
#[derive(Debug, Clone, Error)]
pub enum CompilerError {
    /// Cache miss while nothing is compiling: nothing will ever emit it.
    #[error("File {filename} for {platform} not found in compilation assets (no compilation in progress)")]
    NotFound { filename: String, platform: String },

    /// The compilation finished without emitting the file.
    #[error("File {filename} for {platform} not found in compilation assets")]
    NotFoundAfterCompilation { filename: String, platform: String },

    #[error("Source map for {filename} for {platform} is missing")]
    SourceMapMissing { filename: String, platform: String },

    #[error("Compilation for {platform} failed:\n{}", join_messages(.errors))]
    CompilationFailed {
        platform: String,
        errors: Vec<Diagnostic>,
    },

    /// Emitted assets could not be read back after compilation.
    #[error("Failed to read compilation assets for {platform}: {message}")]
    Materialize { platform: String, message: String },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("Failed to read {}: {message}", .path.display())]
    Source {
        path: PathBuf,
        kind: io::ErrorKind,
        message: String,
    },

    #[error("Worker for {platform} exited{}", .code.map(|c| format!(" with code {c}")).unwrap_or_default())]
    WorkerExited { platform: String, code: Option<i32> },

    #[error("Worker for {platform} failed: {message}")]
    Worker { platform: String, message: String },

    /// The waiter's sender was dropped without a result.
    #[error("Request for {filename} ({platform}) was abandoned")]
    Abandoned { filename: String, platform: String },

    #[error("Unknown platform `{0}`")]
    UnknownPlatform(String),
}

impl CompilerError {
    pub fn source_io(path: PathBuf, err: &io::Error) -> Self {
        Self::Source {
            path,
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Whether an HTTP boundary should answer 404.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. }
            | Self::NotFoundAfterCompilation { .. }
            | Self::SourceMapMissing { .. }
            | Self::UnknownPlatform(_) => true,
            Self::Source { kind, .. } => *kind == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

fn join_messages(errors: &[Diagnostic]) -> String {
    errors
        .iter()
        .map(|e| match &e.module_name {
            Some(module) => format!("{module}: {}", e.message),
            None => e.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = CompilerError::NotFound {
            filename: "main.bundle".into(),
            platform: "ios".into(),
        };
        assert_eq!(
            err.to_string(),
            "File main.bundle for ios not found in compilation assets (no compilation in progress)"
        );

        let err = CompilerError::WorkerExited {
            platform: "android".into(),
            code: Some(1),
        };
        assert_eq!(err.to_string(), "Worker for android exited with code 1");

        let err = CompilerError::CompilationFailed {
            platform: "ios".into(),
            errors: vec![Diagnostic {
                message: "Unexpected token".into(),
                module_name: Some("./App.tsx".into()),
            }],
        };
        assert!(err.to_string().ends_with("./App.tsx: Unexpected token"));
    }

    #[test]
    fn test_is_not_found() {
        let missing = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert!(CompilerError::source_io("a.js".into(), &missing).is_not_found());

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "no");
        assert!(!CompilerError::source_io("a.js".into(), &denied).is_not_found());

        assert!(
            CompilerError::SourceMapMissing {
                filename: "a.bundle".into(),
                platform: "ios".into()
            }
            .is_not_found()
        );
        assert!(!CompilerError::Build(BuildError::Engine("boom".into())).is_not_found());
    }
}
