//! Cache coordinator: get-or-compute with single-flight per key
//!
//! Every call for a canonical key goes through the provider's lock table. The
//! first caller registers a shared computation under the table lock; callers
//! arriving while it is pending await the same computation instead of
//! starting their own. The computation runs on its own task, so it settles
//! even if every caller stops waiting, and it clears its table entry before
//! any waiter observes the outcome.

use crate::entry::Ttl;
use crate::error::{CacheError, Result};
use crate::index::{Identifier, InvalidationIndex};
use crate::key::CacheKey;
use crate::stats::CacheStats;
use crate::storage::memory::MemoryStorage;
use crate::storage::Storage;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::RwLock;

type Computation = Shared<BoxFuture<'static, Result<Value>>>;
type ErasedProducer = Box<dyn FnOnce() -> BoxFuture<'static, Result<Value>> + Send>;

/// Per-call options for [`CacheProvider::get_or_compute`]
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use waypost_cache::{CacheOptions, Ttl};
///
/// let options = CacheOptions::new()
///     .with_ttl(Duration::from_secs(30))
///     .with_producer("load_post")
///     .with_tag("posts");
///
/// assert_eq!(options.ttl, Some(Ttl::from_secs(30)));
/// assert!(!options.force);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Lifetime of a newly computed entry; `None` uses the provider default
    pub ttl: Option<Ttl>,
    /// Recompute even when a fresh entry exists
    pub force: bool,
    /// Identity of the producer, for invalidation by producer
    pub producer: Option<String>,
    /// Tags for bulk invalidation
    pub tags: Vec<String>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: impl Into<Ttl>) -> Self {
        self.ttl = Some(ttl.into());
        self
    }

    pub fn forever(self) -> Self {
        self.with_ttl(Ttl::Forever)
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn force(self) -> Self {
        self.with_force(true)
    }

    pub fn with_producer(mut self, producer: impl Into<String>) -> Self {
        self.producer = Some(producer.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Identifiers a computed entry is recorded under
    pub fn identifiers(&self) -> Vec<Identifier> {
        self.producer
            .iter()
            .map(Identifier::producer)
            .chain(self.tags.iter().map(Identifier::tag))
            .collect()
    }
}

/// A named cache: one storage driver, one lock table, one invalidation index
///
/// Cloning is cheap and clones share all state.
#[derive(Clone)]
pub struct CacheProvider {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    storage: Arc<dyn Storage>,
    default_ttl: Ttl,
    in_flight: Mutex<HashMap<String, Computation>>,
    index: InvalidationIndex,
    stats: RwLock<CacheStats>,
}

/// Removes a key's lock-table entry when its computation task ends
struct ReleaseGuard {
    inner: Weak<Inner>,
    key: String,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            let removed = inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.key);
            // Dropped outside the table lock
            drop(removed);
        }
    }
}

impl CacheProvider {
    /// Create a provider over an existing storage driver
    pub fn new(name: impl Into<String>, storage: Arc<dyn Storage>, default_ttl: Ttl) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                storage,
                default_ttl,
                in_flight: Mutex::new(HashMap::new()),
                index: InvalidationIndex::new(),
                stats: RwLock::new(CacheStats::default()),
            }),
        }
    }

    /// Create a provider backed by a fresh [`MemoryStorage`]
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(MemoryStorage::new()), Ttl::Forever)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.inner.storage
    }

    pub fn default_ttl(&self) -> Ttl {
        self.inner.default_ttl
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        self.inner.stats.read().await.clone()
    }

    /// Number of computations currently pending
    pub fn in_flight(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns the cached value for `key`, computing and storing it if needed
    ///
    /// The producer runs when the entry is missing, expired, or
    /// `options.force` is set. Concurrent calls for the same key share one
    /// producer invocation. A producer error is returned to every waiting
    /// caller and leaves the cache untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use waypost_cache::{cache_key, CacheOptions, CacheProvider};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), waypost_cache::CacheError> {
    /// let cache = CacheProvider::in_memory("default");
    ///
    /// let first: u32 = cache
    ///     .get_or_compute(cache_key!["answer"], || async { Ok(42) }, CacheOptions::new())
    ///     .await?;
    /// let second: u32 = cache
    ///     .get_or_compute(cache_key!["answer"], || async { Ok(7) }, CacheOptions::new())
    ///     .await?;
    ///
    /// assert_eq!((first, second), (42, 42));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: impl Into<CacheKey>,
        producer: F,
        options: CacheOptions,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let key = key.into();
        let canonical = key.as_str().to_string();

        let producer_key = canonical.clone();
        let produce: ErasedProducer = Box::new(move || {
            async move {
                let value = producer()
                    .await
                    .map_err(|err| CacheError::producer(&producer_key, err))?;
                serde_json::to_value(value)
                    .map_err(|err| CacheError::serialization(&producer_key, err))
            }
            .boxed()
        });

        let value = self.resolve(&canonical, produce, options).await?;
        serde_json::from_value(value).map_err(|err| CacheError::serialization(&canonical, err))
    }

    /// Like [`get_or_compute`](Self::get_or_compute) with a ready value instead of a producer
    pub async fn get_or_set<T>(
        &self,
        key: impl Into<CacheKey>,
        value: T,
        options: CacheOptions,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        self.get_or_compute(key, move || async move { Ok(value) }, options)
            .await
    }

    /// Deletes every entry associated with `id`, returning how many were removed
    ///
    /// Identifiers with no associated entries are a no-op.
    pub async fn invalidate(&self, id: &Identifier) -> Result<usize> {
        let inner = &self.inner;
        let keys = inner.index.take(id);

        if keys.is_empty() {
            tracing::debug!(provider = %inner.name, identifier = %id, "nothing to invalidate");
            return Ok(0);
        }

        for (done, key) in keys.iter().enumerate() {
            if let Err(err) = inner.storage.delete(key).await {
                // Keep the remaining keys findable for a retry
                for key in &keys[done..] {
                    inner.index.record(key, [id]);
                }
                return Err(inner.driver_error(err));
            }
            inner.index.forget_key(key);
        }

        inner.stats.write().await.invalidations += keys.len() as u64;
        tracing::debug!(
            provider = %inner.name,
            identifier = %id,
            count = keys.len(),
            "invalidated cache entries"
        );

        Ok(keys.len())
    }

    /// Deletes a single entry by key
    pub async fn invalidate_key(&self, key: impl Into<CacheKey>) -> Result<()> {
        let key = key.into();
        let inner = &self.inner;

        inner
            .storage
            .delete(key.as_str())
            .await
            .map_err(|err| inner.driver_error(err))?;
        inner.index.forget_key(key.as_str());
        inner.stats.write().await.invalidations += 1;

        tracing::debug!(provider = %inner.name, key = %key, "invalidated cache key");
        Ok(())
    }

    /// Removes every entry and all invalidation associations
    pub async fn clear(&self) -> Result<()> {
        let inner = &self.inner;
        inner
            .storage
            .clear()
            .await
            .map_err(|err| inner.driver_error(err))?;
        inner.index.clear();

        tracing::debug!(provider = %inner.name, "cleared cache");
        Ok(())
    }

    /// Handles to the computations pending right now
    pub(crate) fn pending(&self) -> Vec<Computation> {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    async fn resolve(&self, key: &str, produce: ErasedProducer, options: CacheOptions) -> Result<Value> {
        let (computation, joined) = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            match in_flight.get(key) {
                Some(pending) => (pending.clone(), true),
                None => {
                    let computation = self.start(key, produce, options);
                    in_flight.insert(key.to_string(), computation.clone());
                    (computation, false)
                }
            }
        };

        if joined {
            tracing::debug!(provider = %self.inner.name, key, "joining in-flight computation");
            self.inner.stats.write().await.joined += 1;
        }

        computation.await
    }

    /// Builds the shared computation for `key`; nothing runs until first polled
    fn start(&self, key: &str, produce: ErasedProducer, options: CacheOptions) -> Computation {
        let release = ReleaseGuard {
            inner: Arc::downgrade(&self.inner),
            key: key.to_string(),
        };
        let inner = Arc::clone(&self.inner);
        let key = key.to_string();

        async move {
            let task_key = key.clone();
            let task = tokio::spawn(async move {
                let _release = release;
                inner.compute(&task_key, produce, &options).await
            });

            task.await.unwrap_or_else(|err| {
                let reason = if err.is_panic() {
                    "producer panicked"
                } else {
                    "task cancelled"
                };
                Err(CacheError::Aborted {
                    key,
                    reason: reason.to_string(),
                })
            })
        }
        .boxed()
        .shared()
    }
}

impl Inner {
    async fn compute(&self, key: &str, produce: ErasedProducer, options: &CacheOptions) -> Result<Value> {
        let result = self.read_or_produce(key, produce, options).await;

        if let Err(err) = &result {
            self.stats.write().await.failures += 1;
            tracing::debug!(provider = %self.name, key, error = %err, "cache computation failed");
        }

        result
    }

    async fn read_or_produce(
        &self,
        key: &str,
        produce: ErasedProducer,
        options: &CacheOptions,
    ) -> Result<Value> {
        if !options.force {
            tracing::trace!(provider = %self.name, driver = self.storage.name(), key, "storage get");
            match self.storage.get(key).await.map_err(|err| self.driver_error(err))? {
                Some(entry) if entry.is_fresh() => {
                    self.stats.write().await.hits += 1;
                    tracing::debug!(provider = %self.name, key, "cache hit");
                    return Ok(entry.value);
                }
                Some(_) => {
                    tracing::debug!(provider = %self.name, key, "evicting expired entry");
                    self.storage
                        .delete(key)
                        .await
                        .map_err(|err| self.driver_error(err))?;
                    self.index.forget_key(key);
                }
                None => {}
            }
        }

        self.stats.write().await.misses += 1;
        tracing::debug!(provider = %self.name, key, force = options.force, "cache miss, computing");

        let value = produce().await?;
        let ttl = options.ttl.unwrap_or(self.default_ttl);

        tracing::trace!(provider = %self.name, driver = self.storage.name(), key, ?ttl, "storage set");
        self.storage
            .set(key, value.clone(), ttl)
            .await
            .map_err(|err| self.driver_error(err))?;
        self.index.record(key, &options.identifiers());
        self.stats.write().await.computations += 1;

        Ok(value)
    }

    fn driver_error(&self, err: anyhow::Error) -> CacheError {
        CacheError::driver(self.storage.name(), err)
    }
}

impl fmt::Debug for CacheProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheProvider")
            .field("name", &self.inner.name)
            .field("storage", &self.inner.storage.name())
            .field("default_ttl", &self.inner.default_ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_key;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_hit_returns_stored_value() {
        let cache = CacheProvider::in_memory("test");

        let v: String = cache.get_or_set(cache_key!["k"], "v".to_string(), CacheOptions::new()).await.unwrap();
        let v2: String = cache.get_or_set(cache_key!["k"], "v2".to_string(), CacheOptions::new()).await.unwrap();

        assert_eq!(v, "v");
        assert_eq!(v2, "v");

        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.computations), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_force_recomputes() {
        let cache = CacheProvider::in_memory("test");

        let _: u32 = cache.get_or_set("k", 1, CacheOptions::new()).await.unwrap();
        let forced: u32 = cache.get_or_set("k", 3, CacheOptions::new().force()).await.unwrap();
        let after: u32 = cache.get_or_set("k", 4, CacheOptions::new()).await.unwrap();

        assert_eq!(forced, 3);
        assert_eq!(after, 3);
    }

    #[tokio::test]
    async fn test_lock_entry_released_after_settling() {
        let cache = CacheProvider::in_memory("test");

        let _: u32 = cache.get_or_set("k", 1, CacheOptions::new()).await.unwrap();
        assert_eq!(cache.in_flight(), 0);

        let err = cache
            .get_or_compute::<u32, _, _>("e", || async { anyhow::bail!("boom") }, CacheOptions::new())
            .await
            .unwrap_err();
        assert!(err.is_producer());
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panicking_producer_is_aborted_and_released() {
        let cache = CacheProvider::in_memory("test");

        let err = cache
            .get_or_compute::<u32, _, _>(
                "p",
                || async { panic!("producer exploded") },
                CacheOptions::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Aborted { .. }));
        assert_eq!(cache.in_flight(), 0);

        let v: u32 = cache.get_or_set("p", 5, CacheOptions::new()).await.unwrap();
        assert_eq!(v, 5);
    }

    #[tokio::test]
    async fn test_computation_survives_abandoned_caller() {
        let cache = CacheProvider::in_memory("test");
        let calls = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&calls);
        let slow = cache.get_or_compute::<u32, _, _>(
            "slow",
            move || async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(9)
            },
            CacheOptions::new(),
        );

        // Give up after the computation has started
        assert!(tokio::time::timeout(Duration::from_millis(5), slow).await.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight(), 0);

        let v: u32 = cache.get_or_set("slow", 0, CacheOptions::new()).await.unwrap();
        assert_eq!(v, 9);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_serialization_error() {
        let cache = CacheProvider::in_memory("test");
        let _: String = cache.get_or_set("k", "text".to_string(), CacheOptions::new()).await.unwrap();

        let err = cache.get_or_set::<u32>("k", 1, CacheOptions::new()).await.unwrap_err();
        assert!(matches!(err, CacheError::Serialization { .. }));
    }

    #[test]
    fn test_options_identifiers() {
        let options = CacheOptions::new().with_producer("p").with_tag("a").with_tag("b");
        assert_eq!(
            options.identifiers(),
            vec![Identifier::producer("p"), Identifier::tag("a"), Identifier::tag("b")]
        );
    }
}
