// src/core/cache.rs

use std::{
    fs,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};
use thiserror::Error;

const HASH_TRUNCATE_LENGTH: usize = 16; // 16 bytes = 32 hex characters

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Filesystem Error in blob cache: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache source '{path}' does not exist.")]
    MissingSource { path: String },
}

/// An entry found in the blob cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub path: PathBuf,
    /// Last modification, milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// A content store addressed by arbitrary string keys (URLs, requirement names).
/// Used by fetch and extern actions.
pub trait BlobCache: Send + Sync {
    /// Looks up an existing entry.
    fn get_file(&self, key: &str) -> Option<CachedFile>;

    /// Stores `source` under `key` and returns the entry's path. Without a
    /// source, only reserves the path (parent directories created) so the
    /// caller can write to it.
    fn add_file(&self, key: &str, source: Option<&Path>) -> Result<PathBuf, CacheError>;
}

/// A `BlobCache` kept in a directory, one file per key, named by a truncated
/// blake3 hash of the key.
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    root: PathBuf,
}

impl DirectoryCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let hash = blake3::hash(key.as_bytes());
        let bytes = hash.as_bytes();
        let name = hex::encode(bytes.get(..HASH_TRUNCATE_LENGTH).unwrap_or(bytes.as_slice()));
        self.root.join(name)
    }
}

impl BlobCache for DirectoryCache {
    fn get_file(&self, key: &str) -> Option<CachedFile> {
        let path = self.entry_path(key);
        let metadata = fs::metadata(&path).ok()?;
        if !metadata.is_file() {
            return None;
        }
        let timestamp = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        log::debug!("Blob cache hit for '{}' at '{}'.", key, path.display());
        Some(CachedFile { path, timestamp })
    }

    fn add_file(&self, key: &str, source: Option<&Path>) -> Result<PathBuf, CacheError> {
        fs::create_dir_all(&self.root)?;
        let path = self.entry_path(key);
        if let Some(source) = source {
            if !source.is_file() {
                return Err(CacheError::MissingSource {
                    path: source.display().to_string(),
                });
            }
            fs::copy(source, &path)?;
            log::debug!("Stored '{}' in blob cache as '{}'.", key, path.display());
        }
        Ok(path)
    }
}
