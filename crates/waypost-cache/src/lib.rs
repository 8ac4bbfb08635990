//! # Waypost Cache
//!
//! Keyed get-or-compute caching for request-handling code.
//!
//! ## Features
//!
//! - **Single-flight**: concurrent callers for one key share one producer run
//! - **TTL expiry**: checked lazily on read, no background sweeper
//! - **Forced recomputation** per call
//! - **Invalidation** by producer identity, by tag, or by exact key
//! - **Multiple Storage Backends**: Memory, Filesystem, Dragonfly (Redis)
//! - **Named providers** held by an explicit [`CacheRegistry`]
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use waypost_cache::{cache_key, CacheOptions, CacheProvider, Identifier};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), waypost_cache::CacheError> {
//!     let cache = CacheProvider::in_memory("default");
//!
//!     let options = CacheOptions::new()
//!         .with_ttl(Duration::from_secs(60))
//!         .with_producer("load_user");
//!
//!     let name: String = cache
//!         .get_or_compute(cache_key!["user", 7], || async { Ok("Ada".to_string()) }, options)
//!         .await?;
//!     assert_eq!(name, "Ada");
//!
//!     // Drop everything load_user produced
//!     cache.invalidate(&Identifier::producer("load_user")).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod entry;
pub mod error;
pub mod index;
pub mod key;
pub mod provider;
pub mod registry;
pub mod stats;
pub mod storage;

pub use config::{CacheConfig, CacheTomlConfig, StorageBackend};
pub use entry::{CacheEntry, Ttl};
pub use error::CacheError;
pub use index::Identifier;
pub use key::{CacheKey, KeyPart};
pub use provider::{CacheOptions, CacheProvider};
pub use registry::CacheRegistry;
pub use stats::CacheStats;
pub use storage::Storage;
