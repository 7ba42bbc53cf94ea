// src/core/paths.rs

use crate::constants::BLOB_CACHE_DIRNAME;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find the user cache directory.")]
    CacheDirNotFound,
    #[error("Invalid glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// Expands `~` and environment variables (`$VAR`, `${VAR}`) in a path string.
/// Unknown variables leave the string untouched rather than failing.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(e) => {
            log::debug!("Could not expand '{}': {}. Using it verbatim.", raw, e);
            PathBuf::from(raw)
        }
    }
}

/// Resolves `path` against `base` unless it is already absolute.
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Removes `.` and folds `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonical string form of a path used as a key in dependency records.
///
/// Existing files are canonicalized through the filesystem (symlinks resolved),
/// missing ones are normalized lexically. The result is relative to `cwd` when
/// the path lies inside it and absolute otherwise, always with `/` separators.
pub fn canonical_path(path: &Path, cwd: &Path) -> String {
    let absolute = normalize(&absolutize(path, cwd));
    let resolved = dunce::canonicalize(&absolute).unwrap_or(absolute);
    let cwd = dunce::canonicalize(cwd).unwrap_or_else(|_| normalize(cwd));

    let shown = match resolved.strip_prefix(&cwd) {
        Ok(relative) if relative.as_os_str().is_empty() => PathBuf::from("."),
        Ok(relative) => relative.to_path_buf(),
        Err(_) => resolved,
    };
    shown.to_string_lossy().replace('\\', "/")
}

/// Expands a list of paths or glob patterns relative to `cwd`.
///
/// Entries without glob metacharacters pass through even when they do not exist,
/// so later stages can report them. Glob matches are sorted.
pub fn expand_globs(entries: &[String], cwd: &Path) -> Result<Vec<PathBuf>, PathError> {
    let mut expanded = Vec::new();
    for entry in entries {
        let full = absolutize(&expand_path(entry), cwd);
        if !is_glob(entry) {
            expanded.push(full);
            continue;
        }
        let pattern = full.to_string_lossy().into_owned();
        let mut matches: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|source| PathError::Pattern {
                pattern: pattern.clone(),
                source,
            })?
            .filter_map(|m| match m {
                Ok(path) => Some(path),
                Err(e) => {
                    log::warn!("Skipping unreadable glob match: {}", e);
                    None
                }
            })
            .collect();
        matches.sort();
        log::trace!("Glob '{}' matched {} path(s).", entry, matches.len());
        expanded.extend(matches);
    }
    Ok(expanded)
}

/// Compiles glob patterns (relative to `cwd`) for matching.
pub fn compile_patterns(entries: &[String], cwd: &Path) -> Result<Vec<glob::Pattern>, PathError> {
    entries
        .iter()
        .map(|entry| {
            let full = absolutize(&expand_path(entry), cwd);
            let pattern = normalize(&full).to_string_lossy().into_owned();
            glob::Pattern::new(&pattern).map_err(|source| PathError::Pattern { pattern, source })
        })
        .collect()
}

fn is_glob(entry: &str) -> bool {
    entry.contains(['*', '?', '['])
}

/// Returns the default blob cache directory (`~/.cache/rivet` on Linux).
pub fn default_cache_dir() -> Result<PathBuf, PathError> {
    dirs::cache_dir()
        .map(|dir| dir.join(BLOB_CACHE_DIRNAME))
        .ok_or(PathError::CacheDirNotFound)
}
