//! Local caching layer
//!
//! Mirrors a remote store into a local on-disk cache. Reads are served from
//! the cache when possible, writes go through to the remote and populate the
//! cache on the way, and stale entries are evicted by age.

pub mod atomic;
pub mod evictor;
pub mod freshness;
pub mod proxy;
pub mod stats;
pub mod tee;

pub use atomic::AtomicWriteTransaction;
pub use evictor::{EvictionReport, Evictor};
pub use freshness::FreshnessTracker;
pub use proxy::CacheProxy;
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use tee::TeeReader;

use chrono::{DateTime, Utc};

use crate::store::{Result, Store};

/// A store backed by a local cache, with cache maintenance operations
pub trait CachedStore: Store {
    /// Set the freshness timestamp of a cached entry
    fn touch(&self, path: &str, timestamp: DateTime<Utc>) -> Result<()>;

    /// Evict every cached file last touched strictly before `threshold`
    fn clear_cache_older_than(&self, threshold: DateTime<Utc>) -> Result<EvictionReport>;
}
