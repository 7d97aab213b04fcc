//! What the HTTP layer asks of a compilation back-end.
//!
//! Both the in-process [`Compiler`](super::Compiler) and the out-of-process
//! [`WorkerAdapter`](crate::worker::WorkerAdapter) implement [`AssetSource`];
//! source, source map and MIME handling are shared default methods.

use std::future::Future;
use std::path::{Component, Path};
use std::sync::Arc;

use super::error::CompilerError;
use super::pending::AssetResult;
use crate::reload::message::HmrBody;
use crate::utils::mime;

/// Bundles are named `<entry>.<platform>.bundle` or `<entry>.bundle`.
pub const BUNDLE_EXTENSION: &str = ".bundle";

/// Source maps are named after their asset plus this suffix.
pub const SOURCE_MAP_SUFFIX: &str = ".map";

/// Whether `filename` follows the bundle naming convention.
pub fn is_bundle(filename: &str) -> bool {
    filename.contains(BUNDLE_EXTENSION)
}

/// Platform encoded in a `<entry>.<platform>.bundle` name.
pub fn platform_from_bundle_name(filename: &str) -> Option<&str> {
    let stem = filename.strip_suffix(BUNDLE_EXTENSION)?;
    let (_, platform) = stem.rsplit_once('.')?;
    (!platform.is_empty() && !platform.contains('/')).then_some(platform)
}

pub fn source_map_name(filename: &str) -> String {
    format!("{filename}{SOURCE_MAP_SUFFIX}")
}

/// Content type of a served file.
///
/// Bundles are always JavaScript, whatever the extension table says.
pub fn mime_type(filename: &str) -> &'static str {
    if filename.ends_with(BUNDLE_EXTENSION) {
        return mime::types::JAVASCRIPT;
    }
    let ext = Path::new(filename).extension().and_then(|e| e.to_str());
    mime::lookup(ext).unwrap_or(mime::types::PLAIN)
}

/// Read a project file verbatim from disk.
///
/// Only plain relative paths are accepted, so requests cannot escape `root`.
pub fn read_source(root: &Path, filename: &str) -> Result<Arc<[u8]>, CompilerError> {
    let relative = Path::new(filename.trim_start_matches('/'));
    let path = root.join(relative);

    if relative.as_os_str().is_empty()
        || !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(CompilerError::Source {
            path,
            kind: std::io::ErrorKind::NotFound,
            message: "path is outside of the project root".into(),
        });
    }

    std::fs::read(&path)
        .map(Arc::from)
        .map_err(|e| CompilerError::source_io(path, &e))
}

/// A compilation back-end the dev server can serve from.
pub trait AssetSource: Send + Sync {
    /// Project root used for raw source reads.
    fn root(&self) -> &Path;

    /// Cached asset, or the result of the next compilation of `platform`.
    fn get_asset(&self, filename: &str, platform: &str) -> impl Future<Output = AssetResult> + Send;

    /// `None` until `platform` compiled once.
    fn get_hmr_body(&self, platform: &str) -> Option<HmrBody>;

    /// Bundles (with a platform) come from the compilation, anything else
    /// from disk.
    fn get_source(
        &self,
        filename: &str,
        platform: Option<&str>,
    ) -> impl Future<Output = Result<Arc<[u8]>, CompilerError>> + Send {
        async move {
            match platform {
                Some(platform) if is_bundle(filename) => {
                    Ok(self.get_asset(filename, platform).await?.data)
                }
                _ => read_source(self.root(), filename),
            }
        }
    }

    /// Source map of a bundle. Any failure is reported as a missing map.
    fn get_source_map(
        &self,
        filename: &str,
        platform: &str,
    ) -> impl Future<Output = Result<Arc<[u8]>, CompilerError>> + Send {
        async move {
            let map = source_map_name(filename);
            match self.get_asset(&map, platform).await {
                Ok(asset) => Ok(asset.data),
                Err(e) => {
                    crate::debug!("serve"; "source map {} for {}: {}", map, platform, e);
                    Err(CompilerError::SourceMapMissing {
                        filename: filename.to_string(),
                        platform: platform.to_string(),
                    })
                }
            }
        }
    }

    fn get_mime_type(&self, filename: &str) -> &'static str {
        mime_type(filename)
    }
}
