//! Cache hit/miss accounting

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    /// Reads served from the remote that could not be cached
    pub population_failures: u64,
    /// Percentage of reads served from the cache
    pub hit_rate: f64,
}

/// Counters updated by the proxy on every read
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    population_failures: AtomicU64,
}

impl CacheStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_population_failure(&self) {
        self.population_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        CacheStatsSnapshot {
            hits,
            misses,
            population_failures: self.population_failures.load(Ordering::Relaxed),
            hit_rate,
        }
    }

    /// Log current cache metrics
    pub fn log_metrics(&self) {
        let stats = self.snapshot();
        debug!(
            hits = stats.hits,
            misses = stats.misses,
            population_failures = stats.population_failures,
            hit_rate = format!("{:.1}%", stats.hit_rate),
            "Cache metrics"
        );
    }
}
