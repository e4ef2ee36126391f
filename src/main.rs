//! localcache-proxy - caching proxy between a client and a remote file store
//!
//! Runs the cache janitor, or performs one-off operations through the proxy.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::env;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use localcache_proxy::cache::{CacheProxy, CachedStore};
use localcache_proxy::config::ProxyConfig;
use localcache_proxy::janitor::{self, JanitorConfig};
use localcache_proxy::store::{LocalStore, Store, StoreOptions};

/// CLI command
#[derive(Debug, PartialEq)]
enum Command {
    /// Run the janitor until Ctrl+C (default)
    Watch,
    /// Evict entries untouched since a date, or older than the configured max age
    Evict { before: Option<DateTime<Utc>> },
    /// Read a file through the proxy to stdout
    Get { path: String },
    /// Stream a local file into the store
    Put { path: String, file: PathBuf },
    /// Set a cache entry's freshness timestamp
    Touch { path: String, at: DateTime<Utc> },
    /// List remote contents
    Ls { path: String, deep: bool },
    /// Show help
    Help,
}

/// Parsed command line
#[derive(Debug)]
struct Cli {
    command: Command,
    config: Option<PathBuf>,
}

fn print_help() {
    eprintln!(
        r#"localcache-proxy - Cache a remote file store on local disk

USAGE:
    localcache-proxy [--config <file>]                # Run the janitor (default)
    localcache-proxy [--config <file>] evict [DATE]
    localcache-proxy [--config <file>] get <path>
    localcache-proxy [--config <file>] put <path> <file>
    localcache-proxy [--config <file>] touch <path> <DATE>
    localcache-proxy [--config <file>] ls [path] [--deep]
    localcache-proxy help

COMMANDS:
    watch   Periodically evict stale entries until Ctrl+C
    evict   Evict cache entries last used before DATE (default: now - max age)
    get     Read a file through the cache and write it to stdout
    put     Write a local file through to the remote and the cache
    touch   Set the last-used time of a cached file
    ls      List the remote store
    help    Show this help message

DATE is YYYY-MM-DD (midnight UTC) or RFC 3339 (2021-12-01T10:00:00Z).

ENVIRONMENT:
    LOCALCACHE_CONFIG               JSON config file (alternative to --config)
    LOCALCACHE_DIR                  Local cache directory
    LOCALCACHE_REMOTE_DIR           Remote store directory
    LOCALCACHE_MAX_AGE_SECS         Evict entries unused for this long
    LOCALCACHE_SWEEP_INTERVAL_SECS  Seconds between janitor sweeps
    RUST_LOG                        Log level (trace, debug, info, warn, error)
"#
    );
}

fn parse_args<I>(args: I) -> Result<Cli>
where
    I: IntoIterator<Item = String>,
{
    let mut config = None;
    let mut deep = false;
    let mut positional = Vec::new();

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config requires a file path")?;
                config = Some(PathBuf::from(path));
            }
            "--deep" => deep = true,
            _ => positional.push(arg),
        }
    }

    let Some(name) = positional.first() else {
        return Ok(Cli {
            command: Command::Watch,
            config,
        });
    };

    let command = match name.as_str() {
        "watch" => Command::Watch,
        "evict" => Command::Evict {
            before: positional.get(1).map(|d| parse_date(d)).transpose()?,
        },
        "get" => {
            if positional.len() < 2 {
                bail!("Usage: localcache-proxy get <path>");
            }
            Command::Get {
                path: positional[1].clone(),
            }
        }
        "put" => {
            if positional.len() < 3 {
                bail!("Usage: localcache-proxy put <path> <file>");
            }
            Command::Put {
                path: positional[1].clone(),
                file: PathBuf::from(&positional[2]),
            }
        }
        "touch" => {
            if positional.len() < 3 {
                bail!("Usage: localcache-proxy touch <path> <DATE>");
            }
            Command::Touch {
                path: positional[1].clone(),
                at: parse_date(&positional[2])?,
            }
        }
        "ls" => Command::Ls {
            path: positional.get(1).cloned().unwrap_or_default(),
            deep,
        },
        "help" | "--help" | "-h" => Command::Help,
        other => {
            eprintln!("Unknown command: {}", other);
            Command::Help
        }
    };

    Ok(Cli { command, config })
}

/// Parse `YYYY-MM-DD` as midnight UTC, or a full RFC 3339 timestamp
fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow!("Invalid date: {}", value))?;
        return Ok(midnight.and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid date {:?} (expected YYYY-MM-DD or RFC 3339)", value))
}

/// Build the proxy from configuration
fn open_proxy(config: &ProxyConfig) -> Result<CacheProxy> {
    let remote_dir = config.require_remote_dir()?;
    let remote = LocalStore::new(remote_dir)
        .with_context(|| format!("Failed to open remote store at {}", remote_dir.display()))?;
    CacheProxy::new(Arc::new(remote), &config.cache_dir).with_context(|| {
        format!("Failed to open cache at {}", config.cache_dir.display())
    })
}

/// Run a one-off command against the proxy
fn run_command(command: Command, config: &ProxyConfig, proxy: &CacheProxy) -> Result<()> {
    match command {
        Command::Evict { before } => {
            let threshold = before.unwrap_or_else(|| janitor::threshold(Utc::now(), config.max_age()));
            let report = proxy.clear_cache_older_than(threshold)?;
            let purged = proxy.purge_temp_artifacts(janitor::threshold(Utc::now(), config.temp_max_age()))?;
            println!(
                "Evicted {} of {} cached files ({} failed), purged {} temp files",
                report.evicted, report.scanned, report.failed, purged.evicted
            );
        }
        Command::Get { path } => {
            let mut stream = proxy.read_stream(&path)?;
            let mut stdout = io::stdout().lock();
            io::copy(&mut stream, &mut stdout).context("Failed to write to stdout")?;
        }
        Command::Put { path, file } => {
            let mut source = File::open(&file)
                .with_context(|| format!("Failed to open {}", file.display()))?;
            proxy.write_stream(&path, &mut source, &StoreOptions::default())?;
            info!(path = %path, "Stored");
        }
        Command::Touch { path, at } => {
            proxy.touch(&path, at)?;
        }
        Command::Ls { path, deep } => {
            for entry in proxy.list_contents(&path, deep)? {
                let entry = entry?;
                if entry.is_dir() {
                    println!("{}/", entry.path());
                } else {
                    println!("{}", entry.path());
                }
            }
        }
        Command::Watch | Command::Help => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command
    let cli = match parse_args(env::args().skip(1)) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    if cli.command == Command::Help {
        print_help();
        return Ok(());
    }

    let config = ProxyConfig::load(cli.config.as_deref())?;
    let proxy = Arc::new(open_proxy(&config)?);

    match cli.command {
        Command::Watch => {
            info!(
                cache_dir = %config.cache_dir.display(),
                "Starting cache janitor. Press Ctrl+C to stop."
            );

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let handle = tokio::spawn(janitor::run(
                Arc::clone(&proxy),
                JanitorConfig::from(&config),
                shutdown_rx,
            ));

            // Wait for Ctrl+C
            tokio::signal::ctrl_c().await?;

            info!("Received shutdown signal, stopping janitor...");
            let _ = shutdown_tx.send(true);
            if let Err(e) = handle.await {
                error!(error = %e, "Janitor task failed");
            }

            proxy.log_metrics();
            info!("Shutdown complete.");
        }
        command => {
            let worker = Arc::clone(&proxy);
            tokio::task::spawn_blocking(move || run_command(command, &config, &worker))
                .await
                .context("Command task panicked")??;
        }
    }

    Ok(())
}
