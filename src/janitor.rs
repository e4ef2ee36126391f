//! Cache janitor
//!
//! Background task that periodically evicts cache entries untouched for
//! longer than the configured age and purges temp files left behind by
//! crashed writes. The sweeps themselves are blocking filesystem work and run
//! on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheProxy, CachedStore, EvictionReport};
use crate::config::ProxyConfig;

/// Sweep schedule and age limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JanitorConfig {
    /// Time between sweeps
    pub interval: Duration,
    /// Cache entries untouched for longer than this are evicted
    pub max_age: Duration,
    /// Temp files older than this are purged
    pub temp_max_age: Duration,
}

impl From<&ProxyConfig> for JanitorConfig {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            interval: config.sweep_interval(),
            max_age: config.max_age(),
            temp_max_age: config.temp_max_age(),
        }
    }
}

/// Totals accumulated over the janitor's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JanitorSummary {
    /// Completed sweeps
    pub sweeps: u64,
    /// Cache entries evicted
    pub evicted: u64,
    /// Temp files purged
    pub purged: u64,
    /// Sweeps or entries that failed
    pub errors: u64,
}

/// Run sweeps every `config.interval` until `shutdown` flips to true
///
/// The first sweep runs immediately.
pub async fn run(
    proxy: Arc<CacheProxy>,
    config: JanitorConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JanitorSummary {
    let mut summary = JanitorSummary::default();

    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        interval_secs = config.interval.as_secs(),
        max_age_secs = config.max_age.as_secs(),
        "Cache janitor started"
    );

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                // A dropped sender also means shutdown
                if changed.is_err() || *shutdown.borrow() {
                    info!("Cache janitor shutting down");
                    break;
                }
            }
            _ = ticker.tick() => {
                sweep_once(&proxy, &config, &mut summary).await;
            }
        }
    }

    info!(
        sweeps = summary.sweeps,
        evicted = summary.evicted,
        purged = summary.purged,
        errors = summary.errors,
        "Cache janitor stopped"
    );

    summary
}

/// One eviction pass plus one temp purge
async fn sweep_once(proxy: &Arc<CacheProxy>, config: &JanitorConfig, summary: &mut JanitorSummary) {
    let now = Utc::now();
    let eviction_threshold = threshold(now, config.max_age);
    let purge_threshold = threshold(now, config.temp_max_age);

    let worker = Arc::clone(proxy);
    let result = tokio::task::spawn_blocking(move || {
        let evicted = worker.clear_cache_older_than(eviction_threshold);
        let purged = worker.purge_temp_artifacts(purge_threshold);
        worker.log_metrics();
        (evicted, purged)
    })
    .await;

    let (evicted, purged) = match result {
        Ok(reports) => reports,
        Err(e) => {
            error!(error = %e, "Cache sweep task panicked");
            summary.errors += 1;
            return;
        }
    };

    summary.sweeps += 1;
    tally(evicted, &mut summary.evicted, &mut summary.errors, "eviction");
    tally(purged, &mut summary.purged, &mut summary.errors, "temp purge");

    debug!(sweeps = summary.sweeps, "Cache sweep complete");
}

fn tally(
    report: crate::store::Result<EvictionReport>,
    removed: &mut u64,
    errors: &mut u64,
    what: &str,
) {
    match report {
        Ok(report) => {
            *removed += report.evicted as u64;
            *errors += report.failed as u64;
        }
        Err(e) => {
            warn!(error = %e, sweep = what, "Cache sweep failed");
            *errors += 1;
        }
    }
}

/// `now - age`, saturating at the earliest representable time
pub fn threshold(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
