//! Freshness tracking
//!
//! A cache entry's modification time doubles as its freshness signal: reads
//! bump it to "now" and eviction compares against it. It is never reported
//! as file metadata.

use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::store::{LocalStore, Result};

/// Reads and writes freshness timestamps on the local cache
#[derive(Debug, Clone)]
pub struct FreshnessTracker {
    /// Local cache store
    cache: LocalStore,
}

impl FreshnessTracker {
    /// Create a tracker over the local cache
    pub fn new(cache: LocalStore) -> Self {
        Self { cache }
    }

    /// Set a cache entry's freshness timestamp
    pub fn touch(&self, path: &str, timestamp: DateTime<Utc>) -> Result<()> {
        self.cache.set_modified(path, SystemTime::from(timestamp))?;
        debug!(path = path, timestamp = %timestamp, "Touched cache entry");
        Ok(())
    }

    /// Mark a cache entry as used right now
    pub fn refresh(&self, path: &str) -> Result<()> {
        self.touch(path, Utc::now())
    }
}
