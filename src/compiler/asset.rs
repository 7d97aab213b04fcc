//! Per-platform asset cache.
//!
//! ```text
//! ios     → { "index.bundle" → CompiledAsset, "index.bundle.map" → ..., "main.1.hot-update.js" → ... }
//! android → { ... }
//! ```
//!
//! Hot-update assets only live for one compilation: every merge drops the
//! previous HMR entries of the platform before inserting the new set.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::engine::AssetInfo;

/// One emitted file, held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledAsset {
    pub data: Arc<[u8]>,
    pub info: AssetInfo,
    pub size: u64,
}

impl CompiledAsset {
    pub fn new(data: impl Into<Arc<[u8]>>, info: AssetInfo) -> Self {
        let data = data.into();
        Self {
            size: data.len() as u64,
            data,
            info,
        }
    }

    pub fn is_hot_update(&self) -> bool {
        self.info.hot_module_replacement
    }
}

/// Platform → filename → asset.
#[derive(Debug, Default)]
pub struct AssetCache {
    platforms: FxHashMap<String, FxHashMap<String, CompiledAsset>>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, platform: &str, filename: &str) -> Option<&CompiledAsset> {
        self.platforms.get(platform)?.get(filename)
    }

    /// Replace the platform's asset set with the result of a compilation.
    ///
    /// Prior HMR assets are dropped, other prior assets persist unless
    /// `fresh` contains the same name.
    pub fn merge(&mut self, platform: &str, fresh: impl IntoIterator<Item = (String, CompiledAsset)>) {
        let assets = self.platforms.entry(platform.to_string()).or_default();
        assets.retain(|_, asset| !asset.is_hot_update());
        assets.extend(
            fresh
                .into_iter()
                .map(|(name, asset)| (normalize_name(&name), asset)),
        );
    }

    /// Snapshot of one platform's assets, sorted by name.
    #[cfg(test)]
    pub fn assets(&self, platform: &str) -> Vec<(String, CompiledAsset)> {
        let mut assets: Vec<_> = self
            .platforms
            .get(platform)
            .map(|assets| {
                assets
                    .iter()
                    .map(|(name, asset)| (name.clone(), asset.clone()))
                    .collect()
            })
            .unwrap_or_default();
        assets.sort_by(|a, b| a.0.cmp(&b.0));
        assets
    }

    /// Number of cached assets of a platform.
    #[cfg(test)]
    pub fn len(&self, platform: &str) -> usize {
        self.platforms.get(platform).map_or(0, FxHashMap::len)
    }
}

/// Asset names always use `/`, whatever the build host.
pub fn normalize_name(name: &str) -> String {
    name.replace('\\', "/")
}
