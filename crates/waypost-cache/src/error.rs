//! Error types for cache coordination

use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by [`CacheProvider`](crate::CacheProvider) and
/// [`CacheRegistry`](crate::CacheRegistry)
///
/// Cloneable so a single failed computation can be handed to every caller
/// that joined it.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The producer returned an error; nothing was written to the cache
    #[error("cache producer failed for `{key}`: {cause:#}")]
    Producer {
        key: String,
        cause: Arc<anyhow::Error>,
    },

    /// The storage driver failed to read, write or delete
    #[error("storage driver `{driver}` failed: {cause:#}")]
    Driver {
        driver: &'static str,
        cause: Arc<anyhow::Error>,
    },

    /// A value could not be converted to or from its stored JSON form
    #[error("cache value for `{key}` could not be (de)serialized: {source}")]
    Serialization {
        key: String,
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// No provider was registered under this name
    #[error("cache provider `{0}` was never initialized")]
    UnknownProvider(String),

    /// The computation task panicked or was cancelled before settling
    #[error("computation for `{key}` was aborted: {reason}")]
    Aborted { key: String, reason: String },
}

impl CacheError {
    pub(crate) fn producer(key: &str, cause: anyhow::Error) -> Self {
        CacheError::Producer {
            key: key.to_string(),
            cause: Arc::new(cause),
        }
    }

    pub(crate) fn driver(driver: &'static str, cause: anyhow::Error) -> Self {
        CacheError::Driver {
            driver,
            cause: Arc::new(cause),
        }
    }

    pub(crate) fn serialization(key: &str, source: serde_json::Error) -> Self {
        CacheError::Serialization {
            key: key.to_string(),
            source: Arc::new(source),
        }
    }

    /// Whether the failure came from the producer rather than the cache itself
    pub fn is_producer(&self) -> bool {
        matches!(self, CacheError::Producer { .. })
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
