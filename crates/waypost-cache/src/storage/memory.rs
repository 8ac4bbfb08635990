//! In-memory storage driver

use crate::entry::{CacheEntry, Ttl};
use crate::storage::Storage;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory storage driver
///
/// Stores entries in a HashMap shared between clones.
/// Fast but non-persistent - cache is lost on restart.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    cache: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryStorage {
    /// Create a new memory storage driver
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included
    pub async fn size(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Drops every expired entry, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|_, entry| entry.is_fresh());
        before - cache.len()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let cache = self.cache.read().await;
        Ok(cache.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value, ttl: Ttl) -> Result<()> {
        let mut cache = self.cache.write().await;
        cache.insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        let cache = self.cache.read().await;
        Ok(cache.contains_key(key))
    }

    async fn set_expiry(&self, key: &str, ttl: Ttl) -> Result<()> {
        let mut cache = self.cache.write().await;
        if let Some(entry) = cache.get_mut(key) {
            entry.reset_expiry(ttl);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut cache = self.cache.write().await;
        cache.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut cache = self.cache.write().await;
        cache.clear();
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let cache = self.cache.read().await;
        Ok(cache.keys().cloned().collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
