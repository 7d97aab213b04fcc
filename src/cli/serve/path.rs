//! Request URL to route resolution.

use percent_encoding::percent_decode_str;
use tiny_http::Method;
use url::form_urlencoded;

use crate::compiler::source::{SOURCE_MAP_SUFFIX, platform_from_bundle_name};

/// What a request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Status,
    Symbolicate,
    /// Source map of `bundle` (the name without `.map`)
    SourceMap { bundle: String, platform: String },
    Asset { filename: String, platform: String },
    /// Asset request that names no platform
    MissingPlatform(String),
    MethodNotAllowed,
}

/// Resolve a request line to a route.
///
/// The platform comes from `?platform=` or from a `<entry>.<platform>.bundle`
/// name.
pub fn route(method: &Method, url: &str) -> Route {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let path = normalize_path(path);

    match (method, path.as_str()) {
        (Method::Get | Method::Head, "status") => return Route::Status,
        (Method::Post, "symbolicate") => return Route::Symbolicate,
        (Method::Get | Method::Head, _) => {}
        _ => return Route::MethodNotAllowed,
    }

    let query_platform = form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == "platform")
        .map(|(_, v)| v.into_owned())
        .filter(|p| !p.is_empty());

    if let Some(bundle) = path.strip_suffix(SOURCE_MAP_SUFFIX) {
        let platform = query_platform.or_else(|| platform_from_bundle_name(bundle).map(str::to_owned));
        return match platform {
            Some(platform) => Route::SourceMap {
                bundle: bundle.to_string(),
                platform,
            },
            None => Route::MissingPlatform(path),
        };
    }

    match query_platform.or_else(|| platform_from_bundle_name(&path).map(str::to_owned)) {
        Some(platform) => Route::Asset {
            filename: path,
            platform,
        },
        None => Route::MissingPlatform(path),
    }
}

/// Decode and trim slashes: `/assets/logo%20dark.png` → `assets/logo dark.png`
fn normalize_path(path: &str) -> String {
    let decoded = percent_decode_str(path)
        .decode_utf8()
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_else(|_| path.to_string());
    decoded.trim_matches('/').to_string()
}
