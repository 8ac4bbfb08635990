//! Per-provider cache statistics

use serde::Serialize;

/// Counters for one cache provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Calls answered from a fresh stored entry
    pub hits: u64,

    /// Calls that found no usable entry (missing, expired or forced)
    pub misses: u64,

    /// Producer invocations that completed successfully
    pub computations: u64,

    /// Calls that awaited a computation another caller had started
    pub joined: u64,

    /// Computations that failed in the producer or the driver
    pub failures: u64,

    /// Entries removed by invalidation
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);

        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 0.75);
    }
}
