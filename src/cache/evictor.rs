//! Age-based eviction
//!
//! Walks the local cache and deletes files whose freshness timestamp is
//! strictly older than a threshold. Directories are left alone and the remote
//! store is never touched.
//!
//! Failures are handled best-effort: an entry that cannot be listed or
//! deleted is logged and counted in the report, and the scan moves on. Only a
//! failure to start the listing aborts the sweep.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::atomic::is_temp_artifact;
use crate::store::{Result, StorageAttributes, Store};

/// Outcome of an eviction sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Files considered
    pub scanned: usize,
    /// Files deleted
    pub evicted: usize,
    /// Entries that could not be listed or deleted
    pub failed: usize,
}

/// Removes stale entries from a cache store
pub struct Evictor<'a> {
    /// Store being swept
    cache: &'a dyn Store,
}

impl<'a> Evictor<'a> {
    /// Create an evictor over a cache store
    pub fn new(cache: &'a dyn Store) -> Self {
        Self { cache }
    }

    /// Delete every file last touched strictly before `threshold`
    pub fn clear_older_than(&self, threshold: DateTime<Utc>) -> Result<EvictionReport> {
        let report = self.sweep(threshold, |_| true)?;
        info!(
            threshold = %threshold,
            scanned = report.scanned,
            evicted = report.evicted,
            failed = report.failed,
            "Cache eviction complete"
        );
        Ok(report)
    }

    /// Delete leftover transaction temp files last touched before `threshold`
    ///
    /// Temp files are normally removed when a write aborts; this catches the
    /// ones left behind by a crash.
    pub fn purge_temp_artifacts(&self, threshold: DateTime<Utc>) -> Result<EvictionReport> {
        let report = self.sweep(threshold, |entry| is_temp_artifact(entry.base_name()))?;
        if report.evicted > 0 || report.failed > 0 {
            info!(
                evicted = report.evicted,
                failed = report.failed,
                "Purged stale temp files"
            );
        }
        Ok(report)
    }

    fn sweep<F>(&self, threshold: DateTime<Utc>, select: F) -> Result<EvictionReport>
    where
        F: Fn(&StorageAttributes) -> bool,
    {
        let cutoff = threshold.timestamp();
        let mut report = EvictionReport::default();

        for entry in self.cache.list_contents("", true)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Failed to list cache entry, skipping");
                    report.failed += 1;
                    continue;
                }
            };
            if !entry.is_file() || !select(&entry) {
                continue;
            }
            report.scanned += 1;

            let Some(last_modified) = entry.last_modified() else {
                warn!(path = entry.path(), "Cache entry has no timestamp, skipping");
                continue;
            };
            if last_modified >= cutoff {
                continue;
            }

            match self.cache.delete(entry.path()) {
                Ok(()) => {
                    debug!(path = entry.path(), last_modified = last_modified, "Evicted cached file");
                    report.evicted += 1;
                }
                Err(e) => {
                    warn!(path = entry.path(), error = %e, "Failed to evict cached file");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
