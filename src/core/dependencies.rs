// src/core/dependencies.rs

//! # Incremental Dependency Engine
//!
//! Decides which sources of a compile action must be rebuilt.
//!
//! - `FilesModifiedCache` memoizes modification times for one compile action.
//! - `needs_rebuild` compares a source, its object and its recorded dependencies.
//! - `DependencyMap` is the persisted `source -> DependencyRecord` map, stored as
//!   gzip-compressed JSON under the action's output directory.
//! - `IncrementalEngine` ties them together with a discovery strategy.
//!
//! Only direct dependencies are recorded and checked. A header included by
//! another header is not seen unless the discovery strategy reports it directly.

use crate::constants::DEPENDENCY_CACHE_VERSION;
use crate::core::discovery::{Discovery, DiscoveryError};
use crate::core::paths::canonical_path;
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DependencyError {
    #[error("Failed to access dependency cache '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode dependency cache: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

type DependencyResult<T> = Result<T, DependencyError>;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn modified_millis(path: &Path) -> u64 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

// --- Modification times ---

/// Memoized modification times keyed by canonical path. A missing file has
/// time zero.
#[derive(Debug)]
pub struct FilesModifiedCache {
    cwd: PathBuf,
    times: Mutex<HashMap<String, u64>>,
}

impl FilesModifiedCache {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            times: Mutex::new(HashMap::new()),
        }
    }

    /// Modification time of `path` in milliseconds, or 0 when it does not exist.
    pub fn modified_time(&self, path: &Path) -> u64 {
        let key = canonical_path(path, &self.cwd);
        let mut times = self.times.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(&time) = times.get(&key) {
            return time;
        }
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        };
        let time = modified_millis(&absolute);
        log::trace!("mtime('{}') = {}", key, time);
        times.insert(key, time);
        time
    }
}

// --- Rebuild decision ---

/// Explicit rebuild overrides: the global force flag and the `rebuildPaths` globs.
#[derive(Debug, Default)]
pub struct RebuildPolicy {
    pub force: bool,
    pub patterns: Vec<glob::Pattern>,
}

impl RebuildPolicy {
    /// True when `source` (absolute) must be rebuilt regardless of timestamps.
    pub fn forces(&self, source: &Path) -> bool {
        self.force || self.patterns.iter().any(|p| p.matches_path(source))
    }
}

/// Timestamp comparison for one source.
///
/// Rebuild when the source or the object is missing, when the source is not
/// strictly older than the object, or when any dependency is strictly newer
/// than the object.
pub fn needs_rebuild(
    source: &Path,
    object: &Path,
    dependencies: &[String],
    times: &FilesModifiedCache,
) -> bool {
    let source_time = times.modified_time(source);
    let object_time = times.modified_time(object);
    if source_time == 0 || object_time == 0 {
        return true;
    }
    if source_time >= object_time {
        return true;
    }
    dependencies
        .iter()
        .any(|dep| times.modified_time(Path::new(dep)) > object_time)
}

// --- Persistent map ---

/// The dependencies discovered for one source.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DependencyRecord {
    /// When the record was computed, milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub dependencies: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug)]
struct DependencyCacheFile {
    version: u32,
    timestamp: u64,
    cwd: String,
    sources: BTreeMap<String, DependencyRecord>,
}

/// Source path -> record, plus a flag telling whether anything changed.
#[derive(Debug, Default)]
pub struct DependencyMap {
    sources: BTreeMap<String, DependencyRecord>,
    any_update: bool,
}

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a map. A missing file, a file from another format version, or an
    /// unreadable file all yield an empty map.
    pub fn load(path: &Path) -> Self {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                log::debug!("No dependency cache at '{}' ({}).", path.display(), e);
                return Self::new();
            }
        };
        let decoded: Result<DependencyCacheFile, _> =
            serde_json::from_reader(GzDecoder::new(BufReader::new(file)));
        match decoded {
            Ok(cache) if cache.version == DEPENDENCY_CACHE_VERSION => {
                log::debug!(
                    "Loaded {} dependency record(s) from '{}'.",
                    cache.sources.len(),
                    path.display()
                );
                Self {
                    sources: cache.sources,
                    any_update: false,
                }
            }
            Ok(cache) => {
                log::debug!(
                    "Dependency cache version {} != {}; starting fresh.",
                    cache.version,
                    DEPENDENCY_CACHE_VERSION
                );
                Self::new()
            }
            Err(e) => {
                log::warn!(
                    "Ignoring unreadable dependency cache '{}': {}",
                    path.display(),
                    e
                );
                Self::new()
            }
        }
    }

    pub fn get(&self, source: &str) -> Option<&DependencyRecord> {
        self.sources.get(source)
    }

    /// Replaces the record of `source` and marks the map as updated.
    pub fn update(&mut self, source: String, dependencies: Vec<String>) {
        self.sources.insert(
            source,
            DependencyRecord {
                timestamp: now_millis(),
                dependencies,
            },
        );
        self.any_update = true;
    }

    pub fn any_update(&self) -> bool {
        self.any_update
    }

    pub fn sources(&self) -> &BTreeMap<String, DependencyRecord> {
        &self.sources
    }

    /// Writes the map (write to a temporary file, then rename).
    pub fn save(&self, path: &Path, cwd: &Path) -> DependencyResult<()> {
        let io_err = |source| DependencyError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp_path = path.with_extension("tmp");
        let cache = DependencyCacheFile {
            version: DEPENDENCY_CACHE_VERSION,
            timestamp: now_millis(),
            cwd: cwd.to_string_lossy().into_owned(),
            sources: self.sources.clone(),
        };

        let file = File::create(&tmp_path).map_err(io_err)?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        serde_json::to_writer(&mut encoder, &cache)?;
        encoder.finish().map_err(io_err)?;
        fs::rename(&tmp_path, path).map_err(io_err)?;

        log::debug!(
            "Saved {} dependency record(s) to '{}'.",
            self.sources.len(),
            path.display()
        );
        Ok(())
    }
}

// --- Engine ---

/// Per-compile-action view of the dependency machinery.
#[derive(Debug)]
pub struct IncrementalEngine<'a> {
    cwd: PathBuf,
    cache_path: PathBuf,
    times: FilesModifiedCache,
    map: Mutex<DependencyMap>,
    policy: RebuildPolicy,
    discovery: Discovery<'a>,
    incremental: bool,
    dry_run: bool,
}

impl<'a> IncrementalEngine<'a> {
    /// Opens the engine. The map is only loaded in incremental mode.
    pub fn open(
        cwd: &Path,
        cache_path: PathBuf,
        policy: RebuildPolicy,
        discovery: Discovery<'a>,
        incremental: bool,
        dry_run: bool,
    ) -> Self {
        let map = if incremental {
            DependencyMap::load(&cache_path)
        } else {
            DependencyMap::new()
        };
        Self {
            cwd: cwd.to_path_buf(),
            cache_path,
            times: FilesModifiedCache::new(cwd),
            map: Mutex::new(map),
            policy,
            discovery,
            incremental,
            dry_run,
        }
    }

    /// Decides whether `source` must be compiled to `object`, refreshing its
    /// dependency record when it is rebuilt or has none. Safe to call from
    /// several build tasks at once.
    pub fn should_compile(&self, source: &Path, object: &Path) -> DependencyResult<bool> {
        if !self.incremental {
            return Ok(true);
        }
        let key = canonical_path(source, &self.cwd);
        let source_abs = if source.is_absolute() {
            source.to_path_buf()
        } else {
            self.cwd.join(source)
        };

        let recorded = self.lock_map().get(&key).cloned();
        let rebuild = if self.policy.forces(&source_abs) {
            log::debug!("'{}' is forced to rebuild.", key);
            true
        } else {
            match &recorded {
                None => true,
                Some(record) => needs_rebuild(source, object, &record.dependencies, &self.times),
            }
        };

        if (rebuild || recorded.is_none()) && !self.dry_run {
            let dependencies = self.discovery.discover(source, &self.cwd)?;
            log::trace!("'{}' depends on {:?}", key, dependencies);
            self.lock_map().update(key, dependencies);
        }
        Ok(rebuild)
    }

    /// Persists the map when a record changed; never in dry-run mode.
    pub fn finish(&self) -> DependencyResult<bool> {
        let map = self.lock_map();
        if !self.incremental || self.dry_run || !map.any_update() {
            return Ok(false);
        }
        map.save(&self.cache_path, &self.cwd)?;
        Ok(true)
    }

    fn lock_map(&self) -> std::sync::MutexGuard<'_, DependencyMap> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
