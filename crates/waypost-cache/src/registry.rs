//! Named cache providers owned by the application root

use crate::config::{CacheConfig, DEFAULT_PROVIDER};
use crate::entry::Ttl;
use crate::error::{CacheError, Result};
use crate::index::Identifier;
use crate::key::CacheKey;
use crate::provider::{CacheOptions, CacheProvider};
use crate::storage::create_storage;
use crate::storage::memory::MemoryStorage;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

/// Every cache provider of an application, keyed by name
///
/// Built once at startup (usually with [`CacheRegistry::from_config`]) and
/// passed by reference to call sites. Providers never share storage keys or
/// lock-table entries.
///
/// # Examples
///
/// ```
/// use waypost_cache::{cache_key, CacheConfig, CacheOptions, CacheRegistry, Identifier};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let registry = CacheRegistry::from_config(CacheConfig::default()).await?;
///
/// let posts: Vec<String> = registry
///     .get_or_compute(
///         "default",
///         cache_key!["posts", "recent"],
///         || async { Ok(vec!["hello".to_string()]) },
///         CacheOptions::new().with_tag("posts"),
///     )
///     .await?;
/// assert_eq!(posts, vec!["hello"]);
///
/// registry.invalidate(&Identifier::tag("posts"), Some("default")).await?;
/// registry.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct CacheRegistry {
    providers: RwLock<HashMap<String, CacheProvider>>,
    default_ttl: Ttl,
}

impl CacheRegistry {
    /// An empty registry; providers are added with [`register`](Self::register)
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates every configured provider
    pub async fn from_config(config: CacheConfig) -> anyhow::Result<Self> {
        let mut providers = HashMap::with_capacity(config.providers.len());

        for (name, backend) in &config.providers {
            let storage = create_storage(backend).await?;
            tracing::info!(provider = %name, driver = storage.name(), "cache provider initialized");
            providers.insert(
                name.clone(),
                CacheProvider::new(name.clone(), storage, config.default_ttl),
            );
        }

        Ok(Self {
            providers: RwLock::new(providers),
            default_ttl: config.default_ttl,
        })
    }

    /// Adds a provider, returning the one it replaced
    pub fn register(&self, provider: CacheProvider) -> Option<CacheProvider> {
        tracing::info!(provider = provider.name(), "cache provider registered");
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.name().to_string(), provider)
    }

    /// Looks up a provider by name
    pub fn provider(&self, name: &str) -> Result<CacheProvider> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::UnknownProvider(name.to_string()))
    }

    /// The `"default"` provider
    pub fn default_provider(&self) -> Result<CacheProvider> {
        self.provider(DEFAULT_PROVIDER)
    }

    /// Looks up a provider, creating it with `create` on first use
    pub fn provider_or_insert_with(
        &self,
        name: &str,
        create: impl FnOnce() -> CacheProvider,
    ) -> CacheProvider {
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        providers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::info!(provider = name, "cache provider created on first use");
                create()
            })
            .clone()
    }

    /// Looks up a provider, creating an in-memory one on first use
    pub fn provider_or_default(&self, name: &str) -> CacheProvider {
        let default_ttl = self.default_ttl;
        self.provider_or_insert_with(name, || {
            CacheProvider::new(name, Arc::new(MemoryStorage::new()), default_ttl)
        })
    }

    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// [`CacheProvider::get_or_compute`] on the named provider
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        provider: &str,
        key: impl Into<CacheKey>,
        producer: F,
        options: CacheOptions,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.provider(provider)?
            .get_or_compute(key, producer, options)
            .await
    }

    /// Invalidates `id` on one provider, or on all of them when `provider` is `None`
    ///
    /// Naming a provider that was never initialized logs a warning and does
    /// nothing. Returns the number of entries removed.
    pub async fn invalidate(&self, id: &Identifier, provider: Option<&str>) -> Result<usize> {
        let targets = match provider {
            Some(name) => match self.provider(name) {
                Ok(provider) => vec![provider],
                Err(_) => {
                    tracing::warn!(
                        provider = name,
                        identifier = %id,
                        "invalidate called for a cache provider that was never initialized"
                    );
                    return Ok(0);
                }
            },
            None => self.all(),
        };

        let mut removed = 0;
        for provider in targets {
            removed += provider.invalidate(id).await?;
        }
        Ok(removed)
    }

    /// Removes every provider, waiting for their pending computations to settle
    pub async fn shutdown(&self) {
        let providers: Vec<CacheProvider> = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, provider)| provider)
            .collect();

        for provider in providers {
            let pending = provider.pending();
            if !pending.is_empty() {
                tracing::info!(
                    provider = provider.name(),
                    pending = pending.len(),
                    "waiting for in-flight cache computations"
                );
                futures::future::join_all(pending).await;
            }
            tracing::info!(provider = provider.name(), "cache provider shut down");
        }
    }

    fn all(&self) -> Vec<CacheProvider> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_default_config_has_default_provider() {
        let registry = CacheRegistry::from_config(CacheConfig::default()).await.unwrap();
        assert_eq!(registry.provider_names(), vec!["default".to_string()]);
        assert_eq!(registry.default_provider().unwrap().storage().name(), "memory");
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let registry = CacheRegistry::new();
        let err = registry
            .get_or_compute::<u32, _, _>("nope", "k", || async { Ok(1) }, CacheOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::UnknownProvider(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_invalidate_uninitialized_provider_is_noop() {
        let registry = CacheRegistry::new();
        let removed = registry
            .invalidate(&Identifier::tag("t"), Some("missing"))
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_provider_or_default_creates_once() {
        let registry = CacheRegistry::new();
        let a = registry.provider_or_default("pages");
        let _: u32 = a.get_or_set("k", 1, CacheOptions::new()).await.unwrap();

        let b = registry.provider_or_default("pages");
        let v: u32 = b.get_or_set("k", 2, CacheOptions::new()).await.unwrap();
        assert_eq!(v, 1);
    }

    #[tokio::test]
    async fn test_shutdown_empties_registry() {
        let registry = CacheRegistry::from_config(CacheConfig::default()).await.unwrap();
        registry.shutdown().await;
        assert!(registry.provider_names().is_empty());
        assert!(registry.default_provider().is_err());
    }
}
