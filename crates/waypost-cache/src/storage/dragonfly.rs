//! Dragonfly (Redis-compatible) storage driver

use crate::config::DragonflyConfig;
use crate::entry::{CacheEntry, Ttl};
use crate::storage::Storage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Dragonfly storage driver
///
/// Stores entries as JSON strings in Dragonfly (or Redis), shared by every
/// process pointing at the same server and key prefix. Entries with a TTL are
/// also given a server-side expiry, so abandoned keys do not pile up; freshness
/// is still decided from the stored metadata.
///
/// Commands are spread round-robin over `pool_size` multiplexed connections.
#[derive(Clone)]
pub struct DragonflyStorage {
    pool: Arc<[ConnectionManager]>,
    next: Arc<AtomicUsize>,
    config: DragonflyConfig,
}

/// Number of connections opened for a config; at least one
fn pool_len(config: &DragonflyConfig) -> usize {
    usize::try_from(config.pool_size).unwrap_or(usize::MAX).max(1)
}

impl DragonflyStorage {
    /// Create a new Dragonfly storage driver
    pub async fn new(config: DragonflyConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())
            .context("Failed to create Redis/Dragonfly client")?;

        let size = pool_len(&config);
        let mut pool = Vec::with_capacity(size);
        for _ in 0..size {
            let manager = ConnectionManager::new(client.clone())
                .await
                .context("Failed to create connection manager")?;
            pool.push(manager);
        }
        tracing::debug!(url = %config.url, connections = size, "dragonfly pool ready");

        Ok(Self {
            pool: pool.into(),
            next: Arc::new(AtomicUsize::new(0)),
            config,
        })
    }

    /// Number of pooled connections
    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    /// Next connection in round-robin order
    fn conn(&self) -> ConnectionManager {
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        self.pool[slot].clone()
    }

    /// Get the full key with prefix
    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    /// Test connection to Dragonfly/Redis
    pub async fn ping(&self) -> Result<bool> {
        let mut conn = self.conn();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Failed to ping Redis/Dragonfly")?;

        Ok(pong == "PONG")
    }

    async fn prefixed_keys(&self) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let pattern = format!("{}*", self.config.key_prefix);

        redis::cmd("KEYS")
            .arg(&pattern)
            .query_async(&mut conn)
            .await
            .context("Failed to list keys")
    }
}

#[async_trait]
impl Storage for DragonflyStorage {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let full_key = self.full_key(key);
        let mut conn = self.conn();

        let json: Option<String> = conn
            .get(&full_key)
            .await
            .context("Failed to get from Redis/Dragonfly")?;

        json.map(|json| {
            serde_json::from_str(&json).context("Failed to deserialize cache entry")
        })
        .transpose()
    }

    async fn set(&self, key: &str, value: Value, ttl: Ttl) -> Result<()> {
        let full_key = self.full_key(key);
        let mut conn = self.conn();

        let json = serde_json::to_string(&CacheEntry::new(value, ttl))
            .context("Failed to serialize cache entry")?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(&full_key).arg(json);
        if let Some(ttl) = ttl.as_duration() {
            // Server-side expiry trails the logical one so reads still see the entry expire
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX / 2);
            cmd.arg("PX").arg(millis.saturating_mul(2).max(1));
        }

        cmd.query_async::<_, ()>(&mut conn)
            .await
            .context("Failed to set in Redis/Dragonfly")?;

        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        let full_key = self.full_key(key);
        let mut conn = self.conn();

        let exists: bool = conn
            .exists(&full_key)
            .await
            .context("Failed to check existence in Redis/Dragonfly")?;

        Ok(exists)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full_key = self.full_key(key);
        let mut conn = self.conn();

        conn.del::<_, ()>(&full_key)
            .await
            .context("Failed to delete from Redis/Dragonfly")?;

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let keys = self.prefixed_keys().await?;

        if !keys.is_empty() {
            let mut conn = self.conn();
            conn.del::<_, ()>(&keys)
                .await
                .context("Failed to delete keys")?;
        }

        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let prefix = self.config.key_prefix.as_str();

        Ok(self
            .prefixed_keys()
            .await?
            .into_iter()
            .filter_map(|k| k.strip_prefix(prefix).map(str::to_string))
            .collect())
    }

    fn name(&self) -> &'static str {
        "dragonfly"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pool_len_follows_config() {
        let config = |pool_size| DragonflyConfig {
            pool_size,
            ..DragonflyConfig::default()
        };
        assert_eq!(pool_len(&config(10)), 10);
        assert_eq!(pool_len(&config(1)), 1);
        assert_eq!(pool_len(&config(0)), 1);
    }

    // These tests require a running Redis/Dragonfly instance

    async fn create_test_storage() -> Option<DragonflyStorage> {
        let config = DragonflyConfig {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            key_prefix: "waypost:cache:test:".to_string(),
        };

        DragonflyStorage::new(config).await.ok()
    }

    #[tokio::test]
    #[ignore] // Requires Redis/Dragonfly to be running
    async fn test_dragonfly_storage_basic() {
        let Some(storage) = create_test_storage().await else {
            println!("Skipping test: Redis/Dragonfly not available");
            return;
        };

        storage.clear().await.unwrap();

        storage.set(r#"["k"]"#, json!("test content"), Ttl::from_secs(60)).await.unwrap();

        let retrieved = storage.get(r#"["k"]"#).await.unwrap();
        assert_eq!(retrieved.unwrap().value, json!("test content"));
        assert!(storage.has(r#"["k"]"#).await.unwrap());
        assert_eq!(storage.keys().await.unwrap(), vec![r#"["k"]"#.to_string()]);

        storage.delete(r#"["k"]"#).await.unwrap();
        assert!(!storage.has(r#"["k"]"#).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires Redis/Dragonfly to be running
    async fn test_dragonfly_ping() {
        let Some(storage) = create_test_storage().await else {
            println!("Skipping test: Redis/Dragonfly not available");
            return;
        };

        assert_eq!(storage.pool_size(), 10);
        for _ in 0..storage.pool_size() {
            assert!(storage.ping().await.unwrap());
        }
    }
}
