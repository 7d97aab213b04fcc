//! Development server: HTTP asset serving, HMR and symbolication.
//!
//! ```text
//! GET  /status                  → packager-status:running
//! GET  /<bundle>.map?platform=p → AssetSource::get_source_map
//! GET  /<file>?platform=p       → AssetSource::get_asset
//! POST /symbolicate             → Symbolicator::process
//! ws://host:hmr_port/?platform=p  HMR (building / built / sync)
//! ```
//!
//! Requests are routed on a rayon pool. Routes that may wait for a
//! compilation run as tasks on the tokio runtime and answer from a blocking
//! thread, so a request parked on a compilation never holds a pool thread.

mod delegate;
mod lifecycle;
mod path;
mod response;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam::channel;
use tiny_http::{Request, Server};
use tokio::runtime::Handle;

use crate::compiler::source::source_map_name;
use crate::compiler::{AssetSource, Compiler, CompilerOptions};
use crate::config::{BuildMode, ProjectConfig};
use crate::engine::command::CommandEngineFactory;
use crate::symbolicate::{SymbolicateRequest, Symbolicator};
use crate::worker::{ProcessSpawner, WorkerAdapter};
use crate::{debug, log};

pub use delegate::ServerDelegate;
use path::Route;
use response::Reply;

/// Concurrent request handlers.
const REQUEST_THREADS: usize = 8;

/// Start the dev server and block until Ctrl+C.
pub fn serve(config: Arc<ProjectConfig>, verbose: bool) -> Result<()> {
    let (server, addr) = lifecycle::bind_with_retry(&config.server)?;
    let server = Arc::new(server);

    let (shutdown_tx, shutdown_rx) = channel::unbounded::<()>();
    crate::core::register_server(Arc::clone(&server), shutdown_tx);

    let hmr = lifecycle::start_hmr(config.server.host, config.server.hmr_port)?;
    lifecycle::spawn_shutdown_relay(shutdown_rx, hmr.ws_tx.clone());

    let scheme = if config.server.is_https() { "https" } else { "http" };
    log!("serve"; "{}://{}", scheme, addr);
    log!("hmr"; "ws://{}", SocketAddr::new(config.server.host, hmr.port));

    let delegate = Arc::new(ServerDelegate::new(hmr.ws_tx.clone()));
    let handle = hmr.runtime.handle().clone();
    let platforms = config.platforms().to_vec();

    let result = match config.build.mode {
        BuildMode::InProcess => {
            let factory = CommandEngineFactory::new(Arc::clone(&config));
            let options = CompilerOptions {
                root: config.root.clone(),
                platforms,
            };
            let compiler = Arc::new(Compiler::init(options, delegate, &factory)?);
            compiler.start().context("Failed to start watch mode")?;

            let result = run_request_loop(&server, Arc::clone(&compiler), &handle);
            compiler.close();
            result
        }
        BuildMode::Worker => {
            let spawner = ProcessSpawner::new(config.config_path.clone(), config.root.clone(), verbose)?;
            let adapter = Arc::new(WorkerAdapter::new(
                config.root.clone(),
                platforms,
                delegate,
                Box::new(spawner),
            ));
            log!("worker"; "building {} in worker processes", adapter.platforms().join(", "));

            let result = run_request_loop(&server, Arc::clone(&adapter), &handle);
            adapter.close();
            result
        }
    };

    lifecycle::shutdown_hmr(hmr);
    result
}

fn run_request_loop<S: AssetSource + 'static>(server: &Server, source: Arc<S>, handle: &Handle) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(REQUEST_THREADS)
        .thread_name(|i| format!("repack-http-{i}"))
        .build()
        .context("Failed to create request thread pool")?;

    for request in server.incoming_requests() {
        let source = Arc::clone(&source);
        let handle = handle.clone();
        pool.spawn(move || {
            if let Err(e) = handle_request(request, source, &handle) {
                log!("serve"; "request error: {e}");
            }
        });
    }
    Ok(())
}

/// Handle a single HTTP request
fn handle_request<S: AssetSource + 'static>(mut request: Request, source: Arc<S>, handle: &Handle) -> Result<()> {
    if crate::core::is_shutdown() {
        return response::respond_unavailable(request);
    }

    let route = path::route(request.method(), request.url());
    debug!("serve"; "{} {} → {:?}", request.method(), request.url(), route);

    match route {
        Route::Status => response::respond_status(request),
        Route::SourceMap { bundle, platform } => {
            defer(handle, request, async move {
                match source.get_source_map(&bundle, &platform).await {
                    Ok(data) => Reply::Data(data, source.get_mime_type(&source_map_name(&bundle))),
                    Err(e) => Reply::Error(e),
                }
            });
            Ok(())
        }
        Route::Asset { filename, platform } => {
            defer(handle, request, async move {
                match source.get_asset(&filename, &platform).await {
                    Ok(asset) => Reply::Data(asset.data, source.get_mime_type(&filename)),
                    Err(e) => Reply::Error(e),
                }
            });
            Ok(())
        }
        Route::Symbolicate => {
            let mut body = String::new();
            request
                .as_reader()
                .read_to_string(&mut body)
                .context("Failed to read request body")?;

            let parsed: SymbolicateRequest = match serde_json::from_str(&body) {
                Ok(parsed) => parsed,
                Err(e) => {
                    return response::respond_bad_request(request, &format!("invalid stack: {e}"));
                }
            };

            defer(handle, request, async move {
                let results = Symbolicator::new(&*source).process(parsed.stack).await;
                Reply::Json(serde_json::to_vec(&results))
            });
            Ok(())
        }
        Route::MissingPlatform(filename) => response::respond_bad_request(
            request,
            &format!("Missing platform for {filename}: add ?platform=<platform>"),
        ),
        Route::MethodNotAllowed => response::respond_method_not_allowed(request),
    }
}

/// Run `reply` on the runtime and answer `request` once it resolves.
fn defer<F>(handle: &Handle, request: Request, reply: F)
where
    F: Future<Output = Reply> + Send + 'static,
{
    handle.spawn(async move {
        let reply = reply.await;
        let sent = tokio::task::spawn_blocking(move || reply.send(request)).await;
        match sent {
            Ok(Err(e)) => log!("serve"; "request error: {e}"),
            Err(e) => log!("serve"; "response task failed: {e}"),
            Ok(Ok(())) => {}
        }
    });
}
