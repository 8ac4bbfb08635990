//! Filesystem storage driver

use crate::config::FilesystemConfig;
use crate::entry::{CacheEntry, Ttl};
use crate::storage::Storage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::fs;
use walkdir::WalkDir;

const ENTRY_EXTENSION: &str = "json";

/// Longest percent-encoded key used verbatim as a file stem
const MAX_PLAIN_STEM: usize = 200;

/// Prefix of hashed file stems; `@` never survives percent-encoding
const HASHED_PREFIX: char = '@';

/// On-disk form of an entry, carrying its key so hashed names stay reversible
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    entry: CacheEntry,
}

/// How an entry file is named
enum FileName {
    /// Stem is the percent-encoded key
    Plain(String),
    /// Stem is `@` plus the blake3 hex digest of the key
    Hashed,
}

/// Filesystem storage driver
///
/// Stores one JSON file per entry, named after the percent-encoded canonical
/// key. Keys too long for a file name are stored under a blake3 digest
/// instead, with the key kept inside the file. Persistent across restarts, suitable for single-instance deployments.
/// Files are written to a temporary name and renamed into place, so readers
/// never observe a half-written entry.
#[derive(Clone)]
pub struct FilesystemStorage {
    config: FilesystemConfig,
    write_seq: Arc<AtomicU64>,
}

impl FilesystemStorage {
    /// Create a new filesystem storage driver
    pub async fn new(config: FilesystemConfig) -> Result<Self> {
        // Create cache directory if it doesn't exist
        fs::create_dir_all(&config.path)
            .await
            .with_context(|| format!("Failed to create cache directory {}", config.path.display()))?;

        Ok(Self {
            config,
            write_seq: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Get the file path for a cache key
    fn key_to_path(&self, key: &str) -> PathBuf {
        let encoded = urlencoding::encode(key);
        let stem = if encoded.len() <= MAX_PLAIN_STEM {
            encoded.into_owned()
        } else {
            format!("{HASHED_PREFIX}{}", blake3::hash(key.as_bytes()).to_hex())
        };

        self.config.path.join(format!("{stem}.{ENTRY_EXTENSION}"))
    }

    /// Classifies an entry file; `None` for foreign files
    fn file_name(path: &Path) -> Option<FileName> {
        if path.extension()? != ENTRY_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;

        match stem.strip_prefix(HASHED_PREFIX) {
            Some(digest) if digest.len() == 64 && digest.bytes().all(|b| b.is_ascii_hexdigit()) => {
                Some(FileName::Hashed)
            }
            Some(_) => None,
            None => urlencoding::decode(stem)
                .ok()
                .map(|key| FileName::Plain(key.into_owned())),
        }
    }

    async fn read_stored(path: &Path) -> Result<Option<StoredEntry>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to read cache file {}", path.display()))
            }
        };

        let stored = serde_json::from_str(&content)
            .with_context(|| format!("Failed to deserialize cache file {}", path.display()))?;
        Ok(Some(stored))
    }

    fn entry_files(&self) -> impl Iterator<Item = walkdir::DirEntry> {
        WalkDir::new(&self.config.path)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| Self::file_name(e.path()).is_some())
    }

    /// Get cache directory size in bytes
    pub async fn total_size_bytes(&self) -> Result<u64> {
        Ok(self
            .entry_files()
            .filter_map(|entry| entry.metadata().ok())
            .map(|metadata| metadata.len())
            .sum())
    }

    /// Check if cache size exceeds maximum
    pub async fn is_over_limit(&self) -> Result<bool> {
        let total_bytes = self.total_size_bytes().await?;
        let max_bytes = self.config.max_size_mb * 1024 * 1024;

        Ok(total_bytes > max_bytes)
    }

    /// Evict least recently accessed entries until under limit
    pub async fn evict_if_needed(&self) -> Result<()> {
        if !self.is_over_limit().await? {
            return Ok(());
        }

        let mut entries: Vec<(PathBuf, SystemTime)> = self
            .entry_files()
            .filter_map(|entry| {
                let metadata = entry.metadata().ok()?;
                let touched = metadata.accessed().or_else(|_| metadata.modified()).ok()?;
                Some((entry.into_path(), touched))
            })
            .collect();

        // Oldest first
        entries.sort_by_key(|(_, time)| *time);

        for (path, _) in &entries {
            tracing::debug!(path = %path.display(), "evicting cache file over size limit");
            fs::remove_file(path).await.ok();

            if !self.is_over_limit().await? {
                break;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Storage for FilesystemStorage {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let stored = Self::read_stored(&self.key_to_path(key)).await?;

        // A hashed name only belongs to the key recorded inside it
        Ok(stored
            .filter(|stored| stored.key == key)
            .map(|stored| stored.entry))
    }

    async fn set(&self, key: &str, value: Value, ttl: Ttl) -> Result<()> {
        let path = self.key_to_path(key);
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{ENTRY_EXTENSION}.{}.{seq}.tmp", std::process::id()));

        let stored = StoredEntry {
            key: key.to_string(),
            entry: CacheEntry::new(value, ttl),
        };
        let json = serde_json::to_string_pretty(&stored).context("Failed to serialize cache entry")?;

        fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write cache file {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move cache file into {}", path.display()))?;

        // Evict old entries if over limit
        if let Err(err) = self.evict_if_needed().await {
            tracing::warn!(error = %err, "cache size eviction failed");
        }

        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        let path = self.key_to_path(key);
        fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to stat cache file {}", path.display()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.key_to_path(key);

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("Failed to delete cache file {}", path.display()))
            }
        }
    }

    async fn clear(&self) -> Result<()> {
        for entry in self.entry_files() {
            fs::remove_file(entry.path()).await.ok();
        }

        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let files: Vec<walkdir::DirEntry> = self.entry_files().collect();
        let mut keys = Vec::with_capacity(files.len());

        for entry in files {
            match Self::file_name(entry.path()) {
                Some(FileName::Plain(key)) => keys.push(key),
                Some(FileName::Hashed) => {
                    if let Some(stored) = Self::read_stored(entry.path()).await? {
                        keys.push(stored.key);
                    }
                }
                None => {}
            }
        }

        Ok(keys)
    }

    fn name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> FilesystemConfig {
        FilesystemConfig {
            path: dir.path().to_path_buf(),
            max_size_mb: 100,
        }
    }

    #[tokio::test]
    async fn test_filesystem_storage_basic() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(config(&temp_dir)).await.unwrap();

        // Set
        storage.set(r#"["posts",1]"#, json!({"title": "hi"}), Ttl::from_secs(60)).await.unwrap();

        // Get
        let retrieved = storage.get(r#"["posts",1]"#).await.unwrap();
        assert_eq!(retrieved.unwrap().value, json!({"title": "hi"}));

        // Has
        assert!(storage.has(r#"["posts",1]"#).await.unwrap());

        // Delete
        storage.delete(r#"["posts",1]"#).await.unwrap();
        assert!(!storage.has(r#"["posts",1]"#).await.unwrap());
        assert!(storage.get(r#"["posts",1]"#).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_filesystem_keys_roundtrip_canonical_keys() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(config(&temp_dir)).await.unwrap();

        let keys = [r#"["a/b"]"#, r#"["a","b"]"#, r#"["café",null]"#];
        for key in keys {
            storage.set(key, json!(key), Ttl::Forever).await.unwrap();
        }

        let mut stored = storage.keys().await.unwrap();
        stored.sort();
        let mut expected: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        expected.sort();
        assert_eq!(stored, expected);
    }

    #[tokio::test]
    async fn test_filesystem_long_keys_use_hashed_file_names() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(config(&temp_dir)).await.unwrap();

        let query = format!("/search?q={}", "rust async".repeat(30));
        let key = serde_json::to_string(&json!(["page", query])).unwrap();
        assert!(key.len() > 300);

        storage.set(&key, json!(1), Ttl::Forever).await.unwrap();
        assert_eq!(storage.get(&key).await.unwrap().unwrap().value, json!(1));
        assert!(storage.has(&key).await.unwrap());
        assert_eq!(storage.keys().await.unwrap(), vec![key.clone()]);

        let file = std::fs::read_dir(temp_dir.path()).unwrap().next().unwrap().unwrap();
        assert!(file.file_name().len() < 255);
        assert!(file.file_name().to_string_lossy().starts_with('@'));

        storage.delete(&key).await.unwrap();
        assert!(storage.get(&key).await.unwrap().is_none());
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filesystem_short_keys_keep_readable_names() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(config(&temp_dir)).await.unwrap();

        storage.set(r#"["about"]"#, json!(1), Ttl::Forever).await.unwrap();
        assert!(temp_dir.path().join("%5B%22about%22%5D.json").exists());
    }

    #[tokio::test]
    async fn test_filesystem_ignores_foreign_files() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("README.txt"), "not an entry").unwrap();
        let storage = FilesystemStorage::new(config(&temp_dir)).await.unwrap();

        assert!(storage.keys().await.unwrap().is_empty());
        storage.clear().await.unwrap();
        assert!(temp_dir.path().join("README.txt").exists());
    }

    #[tokio::test]
    async fn test_filesystem_set_expiry() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(config(&temp_dir)).await.unwrap();

        storage.set("k", json!(1), Ttl::from_millis(1)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(storage.has_expired("k").await.unwrap());

        storage.set_expiry("k", Ttl::Forever).await.unwrap();
        assert!(!storage.has_expired("k").await.unwrap());
        assert_eq!(storage.get("k").await.unwrap().unwrap().value, json!(1));
    }

    #[tokio::test]
    async fn test_filesystem_evicts_over_limit() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(FilesystemConfig {
            path: temp_dir.path().to_path_buf(),
            max_size_mb: 0,
        })
        .await
        .unwrap();

        storage.set("big", json!("x".repeat(1024)), Ttl::Forever).await.unwrap();
        assert!(!storage.is_over_limit().await.unwrap());
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filesystem_storage_persistence() {
        let temp_dir = TempDir::new().unwrap();

        // Create storage and set a value
        {
            let storage = FilesystemStorage::new(config(&temp_dir)).await.unwrap();
            storage.set("persistent-key", json!("persistent"), Ttl::Forever).await.unwrap();
        }

        // Create new storage instance (simulating restart)
        {
            let storage = FilesystemStorage::new(config(&temp_dir)).await.unwrap();
            let retrieved = storage.get("persistent-key").await.unwrap();
            assert_eq!(retrieved.unwrap().value, json!("persistent"));
        }
    }
}
