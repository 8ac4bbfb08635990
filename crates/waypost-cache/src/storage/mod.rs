//! Storage drivers for cache entries

use crate::config::StorageBackend;
use crate::entry::{CacheEntry, Ttl};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub mod memory;

#[cfg(feature = "filesystem")]
pub mod filesystem;

#[cfg(feature = "dragonfly")]
pub mod dragonfly;

/// Trait for cache storage drivers
///
/// Keys are canonical cache keys. Expiry is never enforced by a background
/// timer: drivers keep the entry metadata and callers check it on read.
/// Drivers must tolerate concurrent calls, including for the same key.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Get an entry by key, expired or not
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Store a value with a fresh expiry clock
    async fn set(&self, key: &str, value: Value, ttl: Ttl) -> Result<()>;

    /// Check if a key exists
    async fn has(&self, key: &str) -> Result<bool>;

    /// Restart the expiry clock of an existing entry; missing keys are ignored
    async fn set_expiry(&self, key: &str, ttl: Ttl) -> Result<()> {
        if let Some(mut entry) = self.get(key).await? {
            entry.reset_expiry(ttl);
            self.set(key, entry.value, entry.ttl).await?;
        }
        Ok(())
    }

    /// Whether the entry exists and has outlived its TTL
    async fn has_expired(&self, key: &str) -> Result<bool> {
        Ok(self
            .get(key)
            .await?
            .is_some_and(|entry| entry.is_expired()))
    }

    /// Delete an entry; missing keys are not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Clear all entries
    async fn clear(&self) -> Result<()>;

    /// Get all keys
    async fn keys(&self) -> Result<Vec<String>>;

    /// Get storage driver name
    fn name(&self) -> &'static str;
}

/// Create a storage driver from config
pub async fn create_storage(backend: &StorageBackend) -> Result<Arc<dyn Storage>> {
    match backend {
        StorageBackend::Memory => Ok(Arc::new(memory::MemoryStorage::new())),
        #[cfg(feature = "filesystem")]
        StorageBackend::Filesystem(config) => {
            let storage = filesystem::FilesystemStorage::new(config.clone()).await?;
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "filesystem"))]
        StorageBackend::Filesystem(_) => {
            anyhow::bail!("Filesystem storage requires the 'filesystem' feature to be enabled")
        }
        #[cfg(feature = "dragonfly")]
        StorageBackend::Dragonfly(config) => {
            let storage = dragonfly::DragonflyStorage::new(config.clone()).await?;
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "dragonfly"))]
        StorageBackend::Dragonfly(_) => {
            anyhow::bail!("Dragonfly storage requires the 'dragonfly' feature to be enabled")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_needs_no_feature() {
        let storage = create_storage(&StorageBackend::Memory).await.unwrap();
        assert_eq!(storage.name(), "memory");
    }

    #[cfg(feature = "filesystem")]
    #[tokio::test]
    async fn test_filesystem_backend_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StorageBackend::Filesystem(crate::config::FilesystemConfig {
            path: dir.path().to_path_buf(),
            max_size_mb: 1,
        });
        let storage = create_storage(&backend).await.unwrap();
        assert_eq!(storage.name(), "filesystem");
    }
}
