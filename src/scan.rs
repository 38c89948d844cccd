use anyhow::{bail, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use crate::config::{default_include_globs, UploadConfig};

/// Which files under the source folder are candidates for upload.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub follow_symlinks: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

impl From<&UploadConfig> for ScanOptions {
    fn from(cfg: &UploadConfig) -> Self {
        Self {
            include_globs: cfg.include_globs.clone(),
            exclude_globs: cfg.exclude_globs.clone(),
            follow_symlinks: cfg.follow_symlinks,
        }
    }
}

/// Recursively list supported files under `root`, sorted by path string.
///
/// Unreadable entries below the root are logged and skipped; only a missing
/// or unreadable root is an error.
pub fn scan_folder(root: &Path, options: &ScanOptions) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        bail!("Source folder does not exist: {}", root.display());
    }
    if !root.is_dir() {
        bail!("Source path is not a directory: {}", root.display());
    }

    let include_set = build_globset(&options.include_globs)?;
    let exclude_set = build_globset(&options.exclude_globs)?;

    let mut files = Vec::new();

    let walker = WalkDir::new(root).follow_links(options.follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !is_regular_file(&entry) {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(path.to_path_buf());
    }

    // Sort for deterministic ordering
    files.sort_by_key(|p| p.to_string_lossy().to_string());

    Ok(files)
}

/// Symlinks to regular files count even when the walk does not descend
/// through links.
fn is_regular_file(entry: &DirEntry) -> bool {
    if entry.file_type().is_file() {
        return true;
    }
    entry.path_is_symlink()
        && std::fs::metadata(entry.path())
            .map(|m| m.is_file())
            .unwrap_or(false)
}

/// Extensions are matched case-insensitively (`REPORT.PDF` counts).
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
    }
    Ok(builder.build()?)
}
