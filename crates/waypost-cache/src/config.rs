//! Cache configuration types

use crate::entry::Ttl;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the provider created when none are configured
pub const DEFAULT_PROVIDER: &str = "default";

/// Runtime cache configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// TTL used when a call does not specify one
    pub default_ttl: Ttl,

    /// Storage backend per provider name
    pub providers: BTreeMap<String, StorageBackend>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Ttl::Forever,
            providers: BTreeMap::from([(DEFAULT_PROVIDER.to_string(), StorageBackend::Memory)]),
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-memory storage (fast, non-persistent)
    Memory,

    /// Filesystem storage (persistent, single-instance)
    Filesystem(FilesystemConfig),

    /// Dragonfly/Redis storage (fast, distributed)
    Dragonfly(DragonflyConfig),
}

/// Filesystem storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilesystemConfig {
    /// Cache directory path
    #[serde(default = "default_cache_dir")]
    pub path: PathBuf,

    /// Maximum cache size in megabytes
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".waypost/cache")
}

fn default_max_size_mb() -> u64 {
    500
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            path: default_cache_dir(),
            max_size_mb: default_max_size_mb(),
        }
    }
}

/// Dragonfly (Redis-compatible) storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DragonflyConfig {
    /// Redis/Dragonfly connection URL
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Key prefix for cache entries
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_pool_size() -> u32 {
    10
}

fn default_key_prefix() -> String {
    "waypost:cache:".to_string()
}

impl Default for DragonflyConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: default_pool_size(),
            key_prefix: default_key_prefix(),
        }
    }
}

/// Top-level TOML document holding a `[cache]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheTomlFile {
    #[serde(default)]
    pub cache: CacheTomlConfig,
}

/// The `[cache]` table of a TOML config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheTomlConfig {
    /// Default TTL in seconds; absent means entries never expire
    pub default_ttl: Option<u64>,

    /// `[cache.providers.<name>]` tables
    #[serde(default)]
    pub providers: BTreeMap<String, StorageBackend>,
}

impl CacheTomlConfig {
    /// Parses a TOML document containing a `[cache]` table
    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        let file: CacheTomlFile =
            toml::from_str(source).context("Failed to parse cache configuration")?;
        Ok(file.cache)
    }

    /// Reads and parses a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&source).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Convert TOML config to runtime config
    pub fn to_runtime_config(&self) -> anyhow::Result<CacheConfig> {
        if let Some(name) = self.providers.keys().find(|name| name.trim().is_empty()) {
            anyhow::bail!("Cache provider name {:?} is empty", name);
        }

        let providers = if self.providers.is_empty() {
            CacheConfig::default().providers
        } else {
            self.providers.clone()
        };

        Ok(CacheConfig {
            default_ttl: self.default_ttl.map_or(Ttl::Forever, Ttl::from_secs),
            providers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_full_config() {
        let config = CacheTomlConfig::from_toml_str(
            r#"
            [cache]
            default_ttl = 60

            [cache.providers.default]
            type = "memory"

            [cache.providers.pages]
            type = "filesystem"
            path = "/tmp/pages"
            max_size_mb = 50

            [cache.providers.shared]
            type = "dragonfly"
            url = "redis://cache:6379"
            "#,
        )
        .unwrap()
        .to_runtime_config()
        .unwrap();

        assert_eq!(config.default_ttl, Ttl::from_secs(60));
        assert_eq!(config.providers["default"], StorageBackend::Memory);
        assert_eq!(
            config.providers["pages"],
            StorageBackend::Filesystem(FilesystemConfig {
                path: PathBuf::from("/tmp/pages"),
                max_size_mb: 50,
            })
        );
        assert_eq!(
            config.providers["shared"],
            StorageBackend::Dragonfly(DragonflyConfig {
                url: "redis://cache:6379".to_string(),
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_empty_config_yields_default_memory_provider() {
        let config = CacheTomlConfig::from_toml_str("").unwrap().to_runtime_config().unwrap();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_unknown_backend_type_is_rejected() {
        let err = CacheTomlConfig::from_toml_str(
            r#"
            [cache.providers.x]
            type = "memcached"
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("memcached"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waypost.toml");
        std::fs::write(&path, "[cache]\ndefault_ttl = 5\n").unwrap();

        let config = CacheTomlConfig::from_file(&path).unwrap();
        assert_eq!(config.default_ttl, Some(5));
        assert!(CacheTomlConfig::from_file(dir.path().join("missing.toml")).is_err());
    }
}
