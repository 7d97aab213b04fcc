//! One compilation of one target.
//!
//! ```text
//! reset staging dir -> run bundler -> ingest files into MemoryFs -> emit chunk manifests -> ChildStats
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Instant;

use anyhow::{Context, Result};
use jwalk::WalkDir;

use crate::engine::manifest::{self, Chunk};
use crate::engine::{AssetInfo, AssetKind, ChildStats, Diagnostic, MemoryFs, StatsAsset, TargetConfig};
use crate::utils::exec::{Cmd, clean_lines};

/// Directory (inside the project root) where bundler commands write.
const STAGING_DIR: &str = ".repack/staging";

/// Length of the reported content hash.
const HASH_LEN: usize = 20;

/// Staging directory of one platform.
pub(crate) fn staging_dir(root: &Path, platform: &str) -> PathBuf {
    root.join(STAGING_DIR).join(platform)
}

/// Compile one target. Never fails: every problem ends up in `errors`.
pub(super) fn build_target(root: &Path, target: &TargetConfig, output_fs: &MemoryFs) -> ChildStats {
    let started = Instant::now();
    let staging = staging_dir(root, &target.name);

    let mut stats = ChildStats {
        name: target.name.clone(),
        output_path: target.output_path.clone(),
        ..Default::default()
    };

    match reset_dir(&staging).and_then(|_| run_command(root, target, &staging)) {
        Ok(output) => collect_diagnostics(&output, target, &mut stats),
        Err(e) => stats.errors.push(Diagnostic::new(format!("{e:#}"))),
    }

    match ingest(&staging, &target.output_path, output_fs) {
        Ok((assets, hash)) => {
            stats.assets = assets;
            stats.hash = hash;
        }
        Err(e) => stats.errors.push(Diagnostic::new(format!("{e:#}"))),
    }

    stats.time = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    stats
}

fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).with_context(|| format!("Failed to clean {}", dir.display()))?;
    }
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))
}

fn run_command(root: &Path, target: &TargetConfig, staging: &Path) -> Result<Output> {
    let command = expand_command(&target.command, &target.name, staging, root);
    if command.is_empty() {
        anyhow::bail!("no build command configured for {}", target.name);
    }

    crate::debug!("build"; "{}: {}", target.name, command.join(" "));

    let staging_str = staging.to_string_lossy().to_string();
    Cmd::from_slice(&command)
        .cwd(root)
        .envs([
            ("REPACK_PLATFORM", target.name.as_str()),
            ("REPACK_OUTPUT", staging_str.as_str()),
        ])
        .envs(target.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .output()
}

/// Substitute `{platform}`, `{output}` and `{root}` placeholders.
pub(super) fn expand_command(command: &[String], platform: &str, output: &Path, root: &Path) -> Vec<String> {
    let output = output.to_string_lossy();
    let root = root.to_string_lossy();
    command
        .iter()
        .map(|part| {
            part.replace("{platform}", platform)
                .replace("{output}", &output)
                .replace("{root}", &root)
        })
        .collect()
}

/// Turn bundler output into stats diagnostics.
///
/// Lines mentioning "warning" are warnings. A failing exit status is an
/// error carrying the error lines of stderr (or all of stderr when none
/// mention "error").
fn collect_diagnostics(output: &Output, target: &TargetConfig, stats: &mut ChildStats) {
    let mut lines = clean_lines(&output.stderr);
    lines.extend(clean_lines(&output.stdout));

    stats.warnings = lines
        .iter()
        .filter(|line| line.to_ascii_lowercase().contains("warning"))
        .map(|line| Diagnostic::new(line.trim()))
        .collect();

    if output.status.success() {
        return;
    }

    let stderr = clean_lines(&output.stderr);
    let errors: Vec<_> = stderr
        .iter()
        .filter(|line| line.to_ascii_lowercase().contains("error"))
        .cloned()
        .collect();

    let message = if !errors.is_empty() {
        errors.join("\n")
    } else if !stderr.is_empty() {
        stderr.join("\n")
    } else {
        format!("build command for {} exited with {}", target.name, output.status)
    };
    stats.errors.push(Diagnostic::new(message));
}

/// Copy every staged file into the memory filesystem and describe it.
///
/// Returns the emitted assets (including generated chunk manifests) and the
/// content hash of the whole set.
fn ingest(staging: &Path, output_path: &Path, output_fs: &MemoryFs) -> Result<(Vec<StatsAsset>, String)> {
    let mut files: Vec<PathBuf> = WalkDir::new(staging)
        .skip_hidden(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path())
        .collect();
    files.sort();

    let stale = output_fs.remove_dir(output_path);
    if stale > 0 {
        crate::debug!("build"; "dropped {} stale outputs of {}", stale, output_path.display());
    }

    let mut hasher = blake3::Hasher::new();
    let mut assets = Vec::with_capacity(files.len());

    for path in &files {
        let name = asset_name(staging, path);
        let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

        hasher.update(name.as_bytes());
        hasher.update(&data);

        let size = data.len() as u64;
        output_fs.write(&output_path.join(&name), data);
        assets.push(StatsAsset {
            kind: if is_hidden(&name) { AssetKind::Hidden } else { AssetKind::Asset },
            info: AssetInfo {
                hot_module_replacement: is_hot_update(&name),
                source_filename: None,
            },
            name,
            size,
        });
    }

    for mut chunk in collect_chunks(&assets) {
        let Some((filename, content)) = manifest::emit(&mut chunk) else {
            continue;
        };
        hasher.update(filename.as_bytes());
        hasher.update(&content);

        let size = content.len() as u64;
        output_fs.write(&output_path.join(&filename), content);
        assets.push(StatsAsset {
            name: filename,
            kind: AssetKind::Asset,
            info: AssetInfo::default(),
            size,
        });
    }

    let hash = hasher.finalize().to_hex()[..HASH_LEN].to_string();
    Ok((assets, hash))
}

/// Every emitted bundle is treated as a chunk of its own, with its source
/// map as auxiliary file.
fn collect_chunks(assets: &[StatsAsset]) -> Vec<Chunk> {
    assets
        .iter()
        .filter(|asset| asset.kind == AssetKind::Asset && !asset.info.hot_module_replacement)
        .filter(|asset| is_chunk_file(&asset.name))
        .map(|asset| {
            let map = format!("{}.map", asset.name);
            let auxiliary_files = assets
                .iter()
                .filter(|other| other.name == map)
                .map(|other| other.name.clone())
                .collect();
            Chunk {
                id: chunk_id(&asset.name),
                name: Some(chunk_id(&asset.name)),
                files: vec![asset.name.clone()],
                auxiliary_files,
            }
        })
        .collect()
}

fn asset_name(staging: &Path, path: &Path) -> String {
    path.strip_prefix(staging)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn is_hidden(name: &str) -> bool {
    name.split('/').any(|segment| segment.starts_with('.'))
}

/// Webpack/rspack name hot updates `[id].[hash].hot-update.{js,json}`.
fn is_hot_update(name: &str) -> bool {
    name.contains(".hot-update.")
}

fn is_chunk_file(name: &str) -> bool {
    name.ends_with(".bundle") || name.ends_with(".js")
}

fn chunk_id(name: &str) -> String {
    let file = name.rsplit('/').next().unwrap_or(name);
    file.trim_end_matches(".bundle")
        .trim_end_matches(".chunk")
        .trim_end_matches(".js")
        .to_string()
}
