//! Proxy configuration
//!
//! Settings come from an optional JSON file, then environment variables
//! override individual fields. Every field has a default except the remote
//! directory, which commands that touch the remote store require.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the JSON config file
pub const CONFIG_ENV: &str = "LOCALCACHE_CONFIG";

/// Entries untouched for this long are evicted (7 days)
pub const DEFAULT_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

/// Orphaned write temp files older than this are purged (1 hour)
pub const DEFAULT_TEMP_MAX_AGE_SECS: u64 = 60 * 60;

/// Interval between janitor sweeps (15 minutes)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 15 * 60;

/// Runtime settings for the proxy and its janitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Root directory of the local cache
    pub cache_dir: PathBuf,
    /// Root directory of the remote store
    pub remote_dir: Option<PathBuf>,
    /// Age after which an untouched cache entry is evicted
    pub max_age_secs: u64,
    /// Age after which a leftover temp file is purged
    pub temp_max_age_secs: u64,
    /// Seconds between janitor sweeps
    pub sweep_interval_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            remote_dir: None,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            temp_max_age_secs: DEFAULT_TEMP_MAX_AGE_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl ProxyConfig {
    /// Load configuration
    ///
    /// # Arguments
    /// * `path` - Config file given on the command line; falls back to
    ///   `LOCALCACHE_CONFIG`, then to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var(CONFIG_ENV).ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_path(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse JSON config text; missing fields take their defaults
    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Apply environment-style overrides
    ///
    /// `lookup` maps a variable name to its value, if set.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("LOCALCACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("LOCALCACHE_REMOTE_DIR") {
            self.remote_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = lookup("LOCALCACHE_MAX_AGE_SECS") {
            self.max_age_secs = parse_secs("LOCALCACHE_MAX_AGE_SECS", &secs)?;
        }
        if let Some(secs) = lookup("LOCALCACHE_SWEEP_INTERVAL_SECS") {
            self.sweep_interval_secs = parse_secs("LOCALCACHE_SWEEP_INTERVAL_SECS", &secs)?;
        }
        Ok(())
    }

    /// Check field values
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            bail!("cache_dir must not be empty");
        }
        if self.max_age_secs == 0 {
            bail!("max_age_secs must be > 0");
        }
        if self.temp_max_age_secs == 0 {
            bail!("temp_max_age_secs must be > 0");
        }
        if self.sweep_interval_secs == 0 {
            bail!("sweep_interval_secs must be > 0");
        }
        if let Some(remote) = &self.remote_dir {
            if remote.as_os_str().is_empty() {
                bail!("remote_dir must not be empty");
            }
            if remote == &self.cache_dir {
                bail!("remote_dir and cache_dir must be different directories");
            }
        }
        Ok(())
    }

    /// Remote directory, required by commands that go through the proxy
    pub fn require_remote_dir(&self) -> Result<&Path> {
        self.remote_dir.as_deref().context(
            "No remote directory configured (set LOCALCACHE_REMOTE_DIR or remote_dir in the config file)",
        )
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn temp_max_age(&self) -> Duration {
        Duration::from_secs(self.temp_max_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("localcache-proxy")
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a whole number of seconds, got {:?}", key, value))
}
