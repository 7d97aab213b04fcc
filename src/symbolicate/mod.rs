//! Stack trace symbolication.
//!
//! React Native reports errors with frames pointing into served bundles
//! (`http://localhost:8081/index.bundle?platform=ios`, line, column).
//! [`Symbolicator`] maps them back to project sources through the bundle's
//! source map, collapses library frames and renders a code frame for the
//! first frame that belongs to the app.

mod source_map;
mod types;

use std::sync::OnceLock;

use regex::Regex;
use rustc_hash::FxHashMap;
use url::Url;

use crate::compiler::AssetSource;
use crate::compiler::source::{is_bundle, platform_from_bundle_name};

use source_map::SourceMap;
pub use types::{
    CodeFrame, CodeFrameLocation, InputStackFrame, ReactNativeStackFrame, StackFrame,
    SymbolicateRequest, SymbolicatorResults,
};

/// Lines shown above and below the failing line.
const CODE_FRAME_CONTEXT: (usize, usize) = (2, 3);

/// A symbolicated frame plus what is needed to render its code frame.
struct Resolved {
    frame: InputStackFrame,
    /// Project-relative source and the platform it was resolved for
    origin: Option<(String, String)>,
    content: Option<String>,
}

pub struct Symbolicator<'a, S> {
    source: &'a S,
}

impl<'a, S: AssetSource> Symbolicator<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Symbolicate `frames`. Frames without a file are dropped; frames that
    /// cannot be mapped are returned unchanged.
    pub async fn process(&self, frames: Vec<ReactNativeStackFrame>) -> SymbolicatorResults {
        let mut maps = FxHashMap::default();
        let mut resolved = Vec::with_capacity(frames.len());

        for frame in frames {
            let Ok(frame) = InputStackFrame::try_from(frame) else {
                continue;
            };
            resolved.push(self.resolve(frame, &mut maps).await);
        }

        let stack: Vec<StackFrame> = resolved
            .iter()
            .map(|r| StackFrame {
                collapse: !include_frame(&r.frame),
                frame: r.frame.clone(),
            })
            .collect();

        let code_frame = match stack.iter().position(|f| !f.collapse) {
            Some(index) => self.code_frame(&resolved[index]).await,
            None => None,
        };

        SymbolicatorResults { code_frame, stack }
    }

    async fn resolve(
        &self,
        frame: InputStackFrame,
        maps: &mut FxHashMap<(String, String), Option<SourceMap>>,
    ) -> Resolved {
        let (Some(line), Some(column)) = (frame.line_number, frame.column) else {
            return unresolved(frame);
        };
        let Some(key) = parse_bundle_url(&frame.file) else {
            return unresolved(frame);
        };

        if !maps.contains_key(&key) {
            let map = self.load_map(&key.0, &key.1).await;
            maps.insert(key.clone(), map);
        }
        let Some(position) = maps
            .get(&key)
            .and_then(Option::as_ref)
            .and_then(|map| map.lookup(line, column))
        else {
            return unresolved(frame);
        };

        let relative = normalize_source(position.source);
        let method_name = match position.name {
            Some(name) if frame.method_name.is_empty() => name.to_string(),
            _ => frame.method_name,
        };

        Resolved {
            frame: InputStackFrame {
                line_number: Some(position.line),
                column: Some(position.column),
                file: self.source.root().join(&relative).to_string_lossy().into_owned(),
                method_name,
            },
            content: position.content.map(str::to_owned),
            origin: Some((relative, key.1)),
        }
    }

    async fn load_map(&self, bundle: &str, platform: &str) -> Option<SourceMap> {
        let data = match self.source.get_source_map(bundle, platform).await {
            Ok(data) => data,
            Err(e) => {
                crate::debug!("symbolicate"; "{}", e);
                return None;
            }
        };
        SourceMap::from_slice(&data)
            .inspect_err(|e| crate::log!("symbolicate"; "{} for {}: {}", bundle, platform, e))
            .ok()
    }

    async fn code_frame(&self, resolved: &Resolved) -> Option<CodeFrame> {
        let (relative, platform) = resolved.origin.as_ref()?;
        let row = resolved.frame.line_number?;
        let column = resolved.frame.column.unwrap_or(0);

        let content = match &resolved.content {
            Some(content) => content.clone(),
            None => {
                let data = self
                    .source
                    .get_source(relative, Some(platform))
                    .await
                    .inspect_err(|e| crate::debug!("symbolicate"; "{}", e))
                    .ok()?;
                String::from_utf8_lossy(&data).into_owned()
            }
        };

        Some(CodeFrame {
            content: render_code_frame(&content, row, column)?,
            location: CodeFrameLocation { row, column },
            file_name: relative.clone(),
        })
    }
}

fn unresolved(frame: InputStackFrame) -> Resolved {
    Resolved {
        frame,
        origin: None,
        content: None,
    }
}

/// `(bundle filename, platform)` of a served bundle URL.
fn parse_bundle_url(file: &str) -> Option<(String, String)> {
    let url = Url::parse(file).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let filename = url.path().trim_start_matches('/').to_string();
    if !is_bundle(&filename) {
        return None;
    }

    let platform = url
        .query_pairs()
        .find(|(k, _)| k == "platform")
        .map(|(_, v)| v.into_owned())
        .or_else(|| platform_from_bundle_name(&filename).map(str::to_owned))?;

    Some((filename, platform))
}

/// Project-relative path of a source map source.
///
/// `webpack://<namespace>/./src/App.tsx` → `src/App.tsx`
fn normalize_source(source: &str) -> String {
    let path = match source.strip_prefix("webpack://") {
        Some(rest) => rest.split_once('/').map_or(rest, |(_, path)| path),
        None => source,
    };
    path.trim_start_matches("./").to_string()
}

/// Library and runtime frames are collapsed in the client.
fn include_frame(frame: &InputStackFrame) -> bool {
    static COLLAPSE: OnceLock<Regex> = OnceLock::new();
    let re = COLLAPSE.get_or_init(|| {
        Regex::new(r"(^|[/\\])(node_modules|react-native[/\\]Libraries)[/\\]|^webpack[/\\](bootstrap|runtime)")
            .unwrap()
    });
    !re.is_match(&frame.file)
}

/// Plain-text code frame around `row` (1-based) with a caret at `column`.
///
/// ```text
///   2 |
/// > 3 | function App() {
///     |     ^
///   4 |   return null;
/// ```
fn render_code_frame(content: &str, row: u32, column: u32) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    let row = row as usize;
    if row == 0 || row > lines.len() {
        return None;
    }

    let (before, after) = CODE_FRAME_CONTEXT;
    let start = row.saturating_sub(before + 1);
    let end = (row + after).min(lines.len());
    let width = end.to_string().len();

    let mut out = Vec::with_capacity(end - start + 1);
    for (index, line) in lines[start..end].iter().enumerate() {
        let number = start + index + 1;
        let marker = if number == row { '>' } else { ' ' };
        out.push(format!("{marker} {number:>width$} | {line}").trim_end().to_string());
        if number == row {
            out.push(format!("  {} | {}^", " ".repeat(width), " ".repeat(column as usize)));
        }
    }
    Some(out.join("\n"))
}
