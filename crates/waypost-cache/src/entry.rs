//! Cached entry types and expiry bookkeeping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// How long an entry stays fresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ttl {
    /// Never expires by time; only explicit invalidation removes it
    #[default]
    Forever,
    /// Expires once strictly more than this much time has passed
    For(Duration),
}

impl Ttl {
    pub fn from_secs(secs: u64) -> Self {
        Ttl::For(Duration::from_secs(secs))
    }

    pub fn from_millis(millis: u64) -> Self {
        Ttl::For(Duration::from_millis(millis))
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Ttl::Forever => None,
            Ttl::For(duration) => Some(*duration),
        }
    }

    pub fn is_forever(&self) -> bool {
        matches!(self, Ttl::Forever)
    }
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Ttl::For(duration)
    }
}

impl From<Option<Duration>> for Ttl {
    fn from(duration: Option<Duration>) -> Self {
        duration.map_or(Ttl::Forever, Ttl::For)
    }
}

/// A stored value with the metadata needed to decide freshness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached value in its serialized form
    pub value: Value,

    /// When the value was produced (or its expiry last reset)
    pub created_at: DateTime<Utc>,

    /// Lifetime measured from `created_at`
    pub ttl: Ttl,
}

impl CacheEntry {
    pub fn new(value: Value, ttl: Ttl) -> Self {
        Self {
            value,
            created_at: Utc::now(),
            ttl,
        }
    }

    /// Age of the entry; zero if the clock went backwards
    pub fn age(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// `now - created_at > ttl`; entries with [`Ttl::Forever`] never expire
    pub fn is_expired(&self) -> bool {
        match self.ttl {
            Ttl::Forever => false,
            Ttl::For(ttl) => self.age() > ttl,
        }
    }

    pub fn is_fresh(&self) -> bool {
        !self.is_expired()
    }

    /// Time left before expiry, `None` for entries that never expire
    pub fn remaining(&self) -> Option<Duration> {
        self.ttl
            .as_duration()
            .map(|ttl| ttl.saturating_sub(self.age()))
    }

    /// Restarts the expiry clock with a new lifetime
    pub fn reset_expiry(&mut self, ttl: Ttl) {
        self.created_at = Utc::now();
        self.ttl = ttl;
    }
}
