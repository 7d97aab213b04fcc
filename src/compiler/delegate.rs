use super::asset::CompiledAsset;
use super::error::CompilerError;
use crate::reload::message::HmrMessage;

/// Serving layer notified by the compiler (HTTP + HMR).
///
/// Called from the build engine's thread, outside the compiler's lock.
/// Implementations must not block.
pub trait BuildDelegate: Send + Sync {
    fn notify_build_start(&self, platform: &str);

    fn notify_build_end(&self, platform: &str);

    /// Assets the last compilation of `platform` added to the cache, sent
    /// right before its `built` broadcast. Empty when nothing was cached.
    fn notify_assets_emitted(&self, _platform: &str, _assets: &[(String, CompiledAsset)]) {}

    fn broadcast_to_hmr_clients(&self, message: HmrMessage, platform: &str);

    /// The watcher died. Pending requests have already been failed.
    fn notify_build_failed(&self, _error: &CompilerError) {}
}
