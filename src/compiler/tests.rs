//! Orchestrator tests against a fake build engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;

use super::*;
use crate::engine::{
    AssetInfo, BuildError, Diagnostic, StatsAsset, TargetConfig,
};

// =============================================================================
// Fixtures
// =============================================================================

/// Shared view of the fake engine, kept by the test to fire hooks.
#[derive(Default, Clone)]
struct EngineHandle {
    observers: Arc<Mutex<Vec<Arc<dyn BuildObserver>>>>,
    on_fatal: Arc<Mutex<Option<FatalHandler>>>,
    fs: Arc<Mutex<Option<Arc<MemoryFs>>>>,
    fail_watch: bool,
}

impl EngineHandle {
    fn watch_run(&self) {
        self.observers.lock().iter().for_each(|o| o.watch_run());
    }

    fn invalid(&self) {
        self.observers.lock().iter().for_each(|o| o.invalid());
    }

    fn done(&self, children: Vec<ChildStats>) {
        let stats = MultiStats { children };
        self.observers.lock().iter().for_each(|o| o.done(&stats));
    }

    fn fatal(&self, error: BuildError) {
        if let Some(on_fatal) = self.on_fatal.lock().as_ref() {
            on_fatal(error);
        }
    }

    /// Write outputs into the memory fs and describe them like the engine would.
    fn emit(&self, platform: &str, files: &[(&str, &str, bool)]) -> ChildStats {
        let fs = self.fs.lock().clone().unwrap();
        let output_path = output_path(platform);
        let assets = files
            .iter()
            .map(|(name, data, hmr)| {
                fs.write(&output_path.join(name), data.as_bytes().to_vec());
                StatsAsset {
                    name: name.to_string(),
                    kind: AssetKind::Asset,
                    info: AssetInfo {
                        hot_module_replacement: *hmr,
                        source_filename: None,
                    },
                    size: data.len() as u64,
                }
            })
            .collect();

        ChildStats {
            name: platform.to_string(),
            time: 42,
            hash: format!("{platform}-hash"),
            output_path,
            assets,
            warnings: vec![],
            errors: vec![],
        }
    }
}

fn output_path(platform: &str) -> PathBuf {
    PathBuf::from("/out").join(platform)
}

struct FakeEngine(EngineHandle);

impl BuildEngine for FakeEngine {
    fn subscribe(&mut self, observer: Arc<dyn BuildObserver>) {
        self.0.observers.lock().push(observer);
    }

    fn watch(&mut self, _options: WatchOptions, on_fatal: FatalHandler) -> Result<(), BuildError> {
        if self.0.fail_watch {
            return Err(BuildError::Watch {
                path: "/app/src".into(),
                message: "permission denied".into(),
            });
        }
        *self.0.on_fatal.lock() = Some(on_fatal);
        Ok(())
    }

    fn close(&mut self) {}
}

struct FakeFactory(EngineHandle);

impl EngineFactory for FakeFactory {
    fn load_target(&self, platform: &str) -> anyhow::Result<TargetConfig> {
        Ok(TargetConfig {
            name: "untagged".into(),
            command: vec!["bundle".into()],
            env: vec![],
            output_path: output_path(platform),
            watch_options: WatchOptions::default(),
        })
    }

    fn create(
        &self,
        targets: Vec<TargetConfig>,
        output_fs: Arc<MemoryFs>,
    ) -> anyhow::Result<Box<dyn BuildEngine>> {
        assert!(targets.iter().all(|t| t.name != "untagged"));
        *self.0.fs.lock() = Some(output_fs);
        Ok(Box::new(FakeEngine(self.0.clone())))
    }
}

#[derive(Default)]
struct RecordingDelegate {
    events: Mutex<Vec<String>>,
    messages: Mutex<Vec<(String, HmrMessage)>>,
    emitted: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingDelegate {
    fn take_events(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl BuildDelegate for RecordingDelegate {
    fn notify_build_start(&self, platform: &str) {
        self.events.lock().push(format!("start:{platform}"));
    }

    fn notify_build_end(&self, platform: &str) {
        self.events.lock().push(format!("end:{platform}"));
    }

    fn notify_assets_emitted(&self, platform: &str, assets: &[(String, CompiledAsset)]) {
        let names = assets.iter().map(|(name, _)| name.clone()).collect();
        self.emitted.lock().push((platform.to_string(), names));
    }

    fn broadcast_to_hmr_clients(&self, message: HmrMessage, platform: &str) {
        let action = match &message {
            HmrMessage::Building => "building",
            HmrMessage::Built { .. } => "built",
            HmrMessage::Sync { .. } => "sync",
        };
        self.events.lock().push(format!("hmr:{platform}:{action}"));
        self.messages.lock().push((platform.to_string(), message));
    }

    fn notify_build_failed(&self, error: &CompilerError) {
        self.events.lock().push(format!("failed:{error}"));
    }
}

struct Fixture {
    compiler: Compiler,
    engine: EngineHandle,
    delegate: Arc<RecordingDelegate>,
}

fn fixture_at(root: &Path, engine: EngineHandle) -> Fixture {
    let delegate = Arc::new(RecordingDelegate::default());
    let compiler = Compiler::init(
        CompilerOptions {
            root: root.to_path_buf(),
            platforms: vec!["ios".into(), "android".into()],
        },
        delegate.clone(),
        &FakeFactory(engine.clone()),
    )
    .unwrap();
    Fixture {
        compiler,
        engine,
        delegate,
    }
}

fn fixture() -> Fixture {
    fixture_at(Path::new("/app"), EngineHandle::default())
}

/// Started compiler with one finished compilation per platform.
fn compiled(ios: &[(&str, &str, bool)], android: &[(&str, &str, bool)]) -> Fixture {
    let f = fixture();
    f.compiler.start().unwrap();
    f.engine.watch_run();
    f.engine
        .done(vec![f.engine.emit("ios", ios), f.engine.emit("android", android)]);
    f.delegate.take_events();
    f
}

async fn still_pending<F: Future>(fut: std::pin::Pin<&mut F>) -> bool {
    tokio::time::timeout(Duration::from_millis(20), fut).await.is_err()
}

// =============================================================================
// get_asset
// =============================================================================

#[tokio::test]
async fn test_never_compiled_rejects_immediately() {
    let f = fixture();

    let err = f.compiler.get_asset("main.bundle", "ios").await.unwrap_err();
    assert!(matches!(err, CompilerError::NotFound { .. }));
    assert!(err.to_string().contains("no compilation in progress"));
}

#[tokio::test]
async fn test_pending_request_resolves_with_emitted_file() {
    let f = fixture();
    f.compiler.start().unwrap();
    f.engine.watch_run();

    let fut = f.compiler.get_asset("index.android.bundle", "android");
    tokio::pin!(fut);
    assert!(still_pending(fut.as_mut()).await);

    let android = f
        .engine
        .emit("android", &[("index.android.bundle", "android code", false)]);
    f.engine.done(vec![f.engine.emit("ios", &[]), android]);

    let asset = fut.await.unwrap();
    assert_eq!(&*asset.data, b"android code");
    assert_eq!(asset.size, 12);
}

#[tokio::test]
async fn test_request_registered_before_first_poll() {
    let f = fixture();
    f.compiler.start().unwrap();

    // done fires between the call and the first poll
    let fut = f.compiler.get_asset("index.bundle", "ios");
    f.engine
        .done(vec![f.engine.emit("ios", &[("index.bundle", "x", false)])]);

    assert_eq!(&*fut.await.unwrap().data, b"x");
}

#[tokio::test]
async fn test_cache_hit_while_compiling() {
    let f = compiled(&[("index.bundle", "v1", false)], &[]);
    f.engine.invalid();
    assert!(f.compiler.is_compiling());

    let asset = f.compiler.get_asset("index.bundle", "ios").await.unwrap();
    assert_eq!(&*asset.data, b"v1");
}

#[tokio::test]
async fn test_missing_after_compilation() {
    let f = fixture();
    f.compiler.start().unwrap();

    let fut = f.compiler.get_asset("other.bundle", "ios");
    f.engine
        .done(vec![f.engine.emit("ios", &[("index.bundle", "x", false)])]);

    let err = fut.await.unwrap_err();
    assert!(matches!(err, CompilerError::NotFoundAfterCompilation { .. }));
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_compile_errors_reject_waiters() {
    let f = fixture();
    f.compiler.start().unwrap();

    let fut = f.compiler.get_asset("index.bundle", "ios");
    let mut ios = f.engine.emit("ios", &[("index.bundle", "broken", false)]);
    ios.errors.push(Diagnostic::new("SyntaxError: Unexpected token"));
    f.engine.done(vec![ios]);

    match fut.await.unwrap_err() {
        CompilerError::CompilationFailed { platform, errors } => {
            assert_eq!(platform, "ios");
            assert_eq!(errors[0].message, "SyntaxError: Unexpected token");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_waiters_of_same_platform_all_resolved() {
    let f = fixture();
    f.compiler.start().unwrap();

    let first = f.compiler.get_asset("index.bundle", "ios");
    let second = f.compiler.get_asset("index.bundle.map", "ios");
    f.engine.done(vec![f.engine.emit(
        "ios",
        &[("index.bundle", "code", false), ("index.bundle.map", "{}", false)],
    )]);

    assert_eq!(&*first.await.unwrap().data, b"code");
    assert_eq!(&*second.await.unwrap().data, b"{}");
}

#[tokio::test]
async fn test_unknown_platform() {
    let f = fixture();
    f.compiler.start().unwrap();

    let err = f.compiler.get_asset("index.bundle", "web").await.unwrap_err();
    assert!(matches!(err, CompilerError::UnknownPlatform(_)));
}

// =============================================================================
// Cache policy
// =============================================================================

#[tokio::test]
async fn test_hot_updates_dropped_next_cycle() {
    let f = compiled(
        &[("index.bundle", "v1", false), ("main.1.hot-update.js", "hmr", true)],
        &[],
    );
    assert!(f.compiler.get_asset("main.1.hot-update.js", "ios").await.is_ok());

    f.engine.invalid();
    f.engine.done(vec![f.engine.emit("ios", &[])]);

    let err = f
        .compiler
        .get_asset("main.1.hot-update.js", "ios")
        .await
        .unwrap_err();
    assert!(matches!(err, CompilerError::NotFound { .. }));
    assert!(f.compiler.get_asset("index.bundle", "ios").await.is_ok());
}

#[tokio::test]
async fn test_non_hot_assets_persist_unless_reemitted() {
    let f = compiled(
        &[("index.bundle", "v1", false), ("logo.png", "png", false)],
        &[],
    );

    f.engine.invalid();
    f.engine
        .done(vec![f.engine.emit("ios", &[("index.bundle", "v2", false)])]);

    let bundle = f.compiler.get_asset("index.bundle", "ios").await.unwrap();
    assert_eq!(&*bundle.data, b"v2");
    let logo = f.compiler.get_asset("logo.png", "ios").await.unwrap();
    assert_eq!(&*logo.data, b"png");

    let names: Vec<_> = f.compiler.assets("ios").into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["index.bundle", "logo.png"]);
}

#[tokio::test]
async fn test_materialize_failure_isolated_per_platform() {
    let f = fixture();
    f.compiler.start().unwrap();

    let ios_fut = f.compiler.get_asset("index.bundle", "ios");
    let android_fut = f.compiler.get_asset("index.bundle", "android");

    let mut ios = f.engine.emit("ios", &[("index.bundle", "ios", false)]);
    // Listed but never written
    ios.assets.push(StatsAsset {
        name: "ghost.png".into(),
        kind: AssetKind::Asset,
        info: AssetInfo::default(),
        size: 1,
    });
    let android = f.engine.emit("android", &[("index.bundle", "android", false)]);
    f.engine.done(vec![ios, android]);

    assert!(matches!(
        ios_fut.await.unwrap_err(),
        CompilerError::Materialize { .. }
    ));
    assert_eq!(&*android_fut.await.unwrap().data, b"android");
    assert!(!f.compiler.is_compiling());

    // The failed platform keeps its previous (empty) set untouched
    assert!(f.compiler.assets("ios").is_empty());

    // The built body reports the failure instead of a clean build
    let ios_body = f.compiler.get_hmr_body("ios").unwrap();
    assert_eq!(ios_body.errors.len(), 1);
    assert!(ios_body.errors[0].message.contains("ghost.png"));
    assert!(f.compiler.get_hmr_body("android").unwrap().errors.is_empty());
}

#[tokio::test]
async fn test_hidden_assets_not_served() {
    let f = fixture();
    f.compiler.start().unwrap();

    let mut ios = f.engine.emit("ios", &[("index.bundle", "x", false)]);
    ios.assets.push(StatsAsset {
        name: ".cache".into(),
        kind: AssetKind::Hidden,
        info: AssetInfo::default(),
        size: 0,
    });
    f.engine.done(vec![ios]);

    assert_eq!(f.compiler.assets("ios").len(), 1);
}

// =============================================================================
// Fatal errors
// =============================================================================

#[tokio::test]
async fn test_fatal_error_rejects_every_platform() {
    let f = fixture();
    f.compiler.start().unwrap();

    let ios = f.compiler.get_asset("index.bundle", "ios");
    let android = f.compiler.get_asset("index.bundle", "android");
    f.engine.fatal(BuildError::Engine("watcher died".into()));

    for fut in [ios, android] {
        match fut.await.unwrap_err() {
            CompilerError::Build(BuildError::Engine(message)) => assert_eq!(message, "watcher died"),
            other => panic!("unexpected error: {other}"),
        }
    }
    assert!(!f.compiler.is_compiling());
    assert!(
        f.delegate
            .take_events()
            .iter()
            .any(|e| e.starts_with("failed:"))
    );

    // Usable again
    f.compiler.start().unwrap();
    assert!(f.compiler.is_compiling());
}

#[tokio::test]
async fn test_watch_setup_failure() {
    let engine = EngineHandle {
        fail_watch: true,
        ..Default::default()
    };
    let f = fixture_at(Path::new("/app"), engine);

    let err = f.compiler.start().unwrap_err();
    assert!(matches!(err, CompilerError::Build(BuildError::Watch { .. })));
    assert!(!f.compiler.is_compiling());
}

// =============================================================================
// Delegate + HMR
// =============================================================================

#[test]
fn test_lifecycle_notifications() {
    let f = fixture();
    f.compiler.start().unwrap();

    f.engine.watch_run();
    assert_eq!(f.delegate.take_events(), vec!["start:ios", "start:android"]);

    f.engine.invalid();
    assert_eq!(
        f.delegate.take_events(),
        vec![
            "start:ios",
            "hmr:ios:building",
            "start:android",
            "hmr:android:building"
        ]
    );

    f.engine
        .done(vec![f.engine.emit("ios", &[]), f.engine.emit("android", &[])]);
    assert_eq!(
        f.delegate.take_events(),
        vec!["end:ios", "hmr:ios:built", "end:android", "hmr:android:built"]
    );

    let messages = f.delegate.messages.lock();
    let (platform, built) = messages.last().unwrap();
    assert_eq!(platform, "android");
    match built {
        HmrMessage::Built { body: Some(body) } => {
            assert_eq!(body.name, "android");
            assert_eq!(body.hash, "android-hash");
            assert_eq!(body.time, 42);
        }
        other => panic!("unexpected message: {other:?}"),
    }
}

#[test]
fn test_hmr_body() {
    let f = fixture();
    assert!(f.compiler.get_hmr_body("ios").is_none());

    f.compiler.start().unwrap();
    let mut ios = f.engine.emit("ios", &[]);
    ios.warnings.push(Diagnostic::new("large bundle"));
    f.engine.done(vec![ios]);

    let body = f.compiler.get_hmr_body("ios").unwrap();
    assert_eq!(body.name, "ios");
    assert_eq!(body.hash, "ios-hash");
    assert_eq!(body.warnings[0].message, "large bundle");
    assert!(body.errors.is_empty());
    assert!(f.compiler.get_hmr_body("android").is_none());
}

// =============================================================================
// Sources, source maps, MIME
// =============================================================================

#[tokio::test]
async fn test_source_map_missing() {
    let f = compiled(&[("app.bundle", "code", false)], &[]);

    let err = f
        .compiler
        .get_source_map("app.bundle", "ios")
        .await
        .unwrap_err();
    assert!(matches!(err, CompilerError::SourceMapMissing { .. }));
    assert_eq!(err.to_string(), "Source map for app.bundle for ios is missing");
}

#[tokio::test]
async fn test_source_map_found() {
    let f = compiled(
        &[("app.bundle", "code", false), ("app.bundle.map", "{\"version\":3}", false)],
        &[],
    );
    let map = f.compiler.get_source_map("app.bundle", "ios").await.unwrap();
    assert_eq!(&*map, b"{\"version\":3}");
}

#[tokio::test]
async fn test_get_source() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/App.tsx"), "export default App").unwrap();

    let f = fixture_at(dir.path(), EngineHandle::default());
    f.compiler.start().unwrap();
    f.engine
        .done(vec![f.engine.emit("ios", &[("index.ios.bundle", "bundle", false)])]);

    let bundle = f
        .compiler
        .get_source("index.ios.bundle", Some("ios"))
        .await
        .unwrap();
    assert_eq!(&*bundle, b"bundle");

    let source = f.compiler.get_source("src/App.tsx", Some("ios")).await.unwrap();
    assert_eq!(&*source, b"export default App");

    let source = f.compiler.get_source("src/App.tsx", None).await.unwrap();
    assert_eq!(&*source, b"export default App");
}

#[test]
fn test_get_mime_type() {
    let f = fixture();
    assert_eq!(
        f.compiler.get_mime_type("main.bundle"),
        crate::utils::mime::types::JAVASCRIPT
    );
    assert_eq!(
        f.compiler.get_mime_type("logo.png"),
        crate::utils::mime::types::PNG
    );
}

// =============================================================================
// Independence
// =============================================================================

#[tokio::test]
async fn test_compilers_are_independent() {
    let a = compiled(&[("index.bundle", "a", false)], &[]);
    let b = fixture();

    assert!(a.compiler.get_asset("index.bundle", "ios").await.is_ok());
    assert!(b.compiler.get_asset("index.bundle", "ios").await.is_err());
    assert!(b.compiler.get_hmr_body("ios").is_none());
}

#[test]
fn test_init_requires_platforms() {
    let result = Compiler::init(
        CompilerOptions {
            root: PathBuf::from("/app"),
            platforms: vec![],
        },
        Arc::new(RecordingDelegate::default()),
        &FakeFactory(EngineHandle::default()),
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn test_emitted_assets_cover_one_compilation() {
    let f = compiled(&[("index.bundle", "v1", false)], &[]);
    f.delegate.emitted.lock().clear();

    f.engine.invalid();
    f.engine.done(vec![f.engine.emit("ios", &[("logo.png", "png", false)])]);

    let emitted = f.delegate.emitted.lock().clone();
    assert_eq!(
        emitted,
        vec![
            ("ios".to_string(), vec!["logo.png".to_string()]),
            ("android".to_string(), vec![]),
        ]
    );
    // The cache still holds the earlier bundle
    assert_eq!(f.compiler.assets("ios").len(), 2);
}
