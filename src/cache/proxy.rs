//! Cache Proxy
//!
//! Implements [`Store`] on top of a remote store and a local cache.
//!
//! Routing:
//! - existence, reads and file size consult the cache first
//! - writes go to the remote and are mirrored into the cache atomically
//! - deletes and directory operations hit both stores
//! - visibility, MIME type and listings come from the remote only
//! - last-modified is never answered: the cache owns that timestamp as its
//!   freshness signal
//!
//! The cache is best-effort. A read whose content cannot be cached still
//! succeeds; a write whose mirror cannot be committed reports the failure and
//! drops any stale cached copy.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::atomic::AtomicWriteTransaction;
use super::evictor::{EvictionReport, Evictor};
use super::freshness::FreshnessTracker;
use super::stats::{CacheStats, CacheStatsSnapshot};
use super::tee::TeeReader;
use super::CachedStore;
use crate::store::path::normalize;
use crate::store::{
    FileAttributes, ListContents, LocalStore, MetadataKind, ReadStream, Result, Store,
    StoreError, StoreOptions, Visibility,
};

/// Store that serves from a local cache and writes through to a remote
pub struct CacheProxy {
    /// Authoritative store
    remote: Arc<dyn Store>,
    /// Local on-disk mirror
    cache: LocalStore,
    /// Freshness timestamps on cache entries
    freshness: FreshnessTracker,
    /// Read hit/miss counters
    stats: CacheStats,
}

impl CacheProxy {
    /// Create a proxy caching `remote` under `cache_dir`
    ///
    /// The cache directory is created if it does not exist.
    pub fn new(remote: Arc<dyn Store>, cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache = LocalStore::new(cache_dir)?;
        Ok(Self::with_cache(remote, cache))
    }

    /// Create a proxy over an existing cache store
    pub fn with_cache(remote: Arc<dyn Store>, cache: LocalStore) -> Self {
        info!(cache_dir = %cache.root().display(), "Cache proxy initialized");
        Self {
            remote,
            freshness: FreshnessTracker::new(cache.clone()),
            cache,
            stats: CacheStats::new(),
        }
    }

    /// The local cache store
    pub fn cache(&self) -> &LocalStore {
        &self.cache
    }

    /// Current read statistics
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Log current read statistics
    pub fn log_metrics(&self) {
        self.stats.log_metrics();
    }

    /// Delete leftover write temp files last touched before `threshold`
    pub fn purge_temp_artifacts(&self, threshold: DateTime<Utc>) -> Result<EvictionReport> {
        Evictor::new(&self.cache).purge_temp_artifacts(threshold)
    }

    /// Check the cache for `path`, treating cache errors as a miss
    fn is_cached(&self, path: &str) -> bool {
        match self.cache.file_exists(path) {
            Ok(cached) => cached,
            Err(e) => {
                warn!(path = path, error = %e, "Cache lookup failed, treating as miss");
                false
            }
        }
    }

    /// Bookkeeping for a cache hit
    fn record_hit(&self, path: &str) {
        self.stats.record_hit();
        if let Err(e) = self.freshness.refresh(path) {
            warn!(path = path, error = %e, "Failed to refresh cache entry");
        }
        debug!(path = path, "Cache HIT");
    }

    /// Copy a cached entry to another cache path through a transaction
    fn mirror_copy(&self, source: &str, destination: &str) -> Result<()> {
        let mut tx = AtomicWriteTransaction::begin(&self.cache, destination)?;
        let mut cached = self.cache.read_stream(source)?;
        tx.copy_from(&mut cached)?;
        tx.commit()?;
        Ok(())
    }

    /// Drop a cached copy that no longer matches the remote
    fn evict_stale(&self, path: &str) {
        if let Err(e) = self.cache.delete(path) {
            warn!(path = path, error = %e, "Failed to drop stale cache entry");
        }
    }
}

/// Treat a missing path as already deleted
fn ignore_missing(result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

impl Store for CacheProxy {
    fn file_exists(&self, path: &str) -> Result<bool> {
        let path = normalize(path)?;
        if self.is_cached(&path) {
            return Ok(true);
        }
        self.remote.file_exists(&path)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize(path)?;

        if self.is_cached(&path) {
            match self.cache.read(&path) {
                Ok(contents) => {
                    self.record_hit(&path);
                    return Ok(contents);
                }
                Err(e) => warn!(path = %path, error = %e, "Cached copy unreadable, using remote"),
            }
        }

        self.stats.record_miss();
        debug!(path = %path, "Cache MISS, fetching from remote");
        let contents = self.remote.read(&path)?;

        let cached = AtomicWriteTransaction::begin(&self.cache, &path)
            .and_then(|tx| tx.write_all(&contents));
        if let Err(e) = cached {
            self.stats.record_population_failure();
            warn!(path = %path, error = %e, "Failed to cache remote read");
        }

        Ok(contents)
    }

    fn read_stream(&self, path: &str) -> Result<ReadStream> {
        let path = normalize(path)?;

        if self.is_cached(&path) {
            match self.cache.read_stream(&path) {
                Ok(stream) => {
                    self.record_hit(&path);
                    return Ok(stream);
                }
                Err(e) => warn!(path = %path, error = %e, "Cached copy unreadable, using remote"),
            }
        }

        self.stats.record_miss();
        debug!(path = %path, "Cache MISS, fetching from remote");
        let mut source = self.remote.read_stream(&path)?;

        let mut tx = match AtomicWriteTransaction::begin(&self.cache, &path) {
            Ok(tx) => tx,
            Err(e) => {
                // Nothing consumed yet, hand the remote stream over as is
                self.stats.record_population_failure();
                warn!(path = %path, error = %e, "Failed to cache remote read");
                return Ok(source);
            }
        };

        let cached = tx.copy_from(&mut source).and_then(|_| tx.commit());
        match cached {
            Ok(size) => {
                debug!(path = %path, size = size, "Cached remote read");
                match self.cache.read_stream(&path) {
                    Ok(stream) => return Ok(stream),
                    Err(e) => {
                        warn!(path = %path, error = %e, "Freshly cached copy unreadable, using remote")
                    }
                }
            }
            // The remote stream itself broke
            Err(e @ StoreError::Read { .. }) => return Err(e),
            Err(e) => {
                self.stats.record_population_failure();
                warn!(path = %path, error = %e, "Failed to cache remote read");
            }
        }

        self.remote.read_stream(&path)
    }

    fn write(&self, path: &str, contents: &[u8], options: &StoreOptions) -> Result<()> {
        let path = normalize(path)?;
        if let Err(e) = self.remote.write(&path, contents, options) {
            self.evict_stale(&path);
            return Err(e);
        }

        let cached = AtomicWriteTransaction::begin(&self.cache, &path)
            .and_then(|tx| tx.write_all(contents));
        if let Err(e) = cached {
            self.evict_stale(&path);
            return Err(e);
        }

        debug!(path = %path, size = contents.len(), "Wrote through to remote and cache");
        Ok(())
    }

    fn write_stream(
        &self,
        path: &str,
        contents: &mut dyn Read,
        options: &StoreOptions,
    ) -> Result<()> {
        let path = normalize(path)?;

        let mut tee = match AtomicWriteTransaction::begin(&self.cache, &path) {
            Ok(tx) => TeeReader::new(contents, tx),
            Err(e) => TeeReader::without_mirror(&path, contents, e),
        };

        if let Err(e) = self.remote.write_stream(&path, &mut tee, options) {
            warn!(path = %path, forwarded = tee.forwarded(), error = %e, "Remote stream write failed");
            let err = tee.into_error(e);
            self.evict_stale(&path);
            return Err(err);
        }

        match tee.finish() {
            Ok(Some(size)) => {
                debug!(path = %path, size = size, "Streamed through to remote and cache");
                Ok(())
            }
            Ok(None) => {
                self.evict_stale(&path);
                Ok(())
            }
            Err(e) => {
                if e.is_cache_population_failure() {
                    warn!(path = %path, error = %e, "Remote write succeeded but cache copy failed");
                }
                self.evict_stale(&path);
                Err(e)
            }
        }
    }

    fn delete(&self, path: &str) -> Result<()> {
        let path = normalize(path)?;
        let cached = ignore_missing(self.cache.delete(&path));
        let remote = ignore_missing(self.remote.delete(&path));
        cached.and(remote)
    }

    fn delete_directory(&self, path: &str) -> Result<()> {
        let path = normalize(path)?;
        let cached = ignore_missing(self.cache.delete_directory(&path));
        let remote = ignore_missing(self.remote.delete_directory(&path));
        cached.and(remote)
    }

    fn create_directory(&self, path: &str, options: &StoreOptions) -> Result<()> {
        let path = normalize(path)?;
        self.remote.create_directory(&path, options)?;
        self.cache.create_directory(&path, options)
    }

    fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        self.remote.set_visibility(&normalize(path)?, visibility)
    }

    fn visibility(&self, path: &str) -> Result<FileAttributes> {
        self.remote.visibility(&normalize(path)?)
    }

    fn mime_type(&self, path: &str) -> Result<FileAttributes> {
        self.remote.mime_type(&normalize(path)?)
    }

    fn last_modified(&self, path: &str) -> Result<FileAttributes> {
        Err(StoreError::metadata(
            path,
            MetadataKind::LastModified,
            "modification time is reserved as the cache freshness signal",
        ))
    }

    fn file_size(&self, path: &str) -> Result<FileAttributes> {
        let path = normalize(path)?;
        if self.is_cached(&path) {
            match self.cache.file_size(&path) {
                Ok(attrs) => return Ok(attrs),
                Err(e) => debug!(path = %path, error = %e, "Cached size unavailable, asking remote"),
            }
        }
        self.remote.file_size(&path)
    }

    fn list_contents(&self, path: &str, deep: bool) -> Result<ListContents<'_>> {
        self.remote.list_contents(&normalize(path)?, deep)
    }

    fn move_file(&self, source: &str, destination: &str, options: &StoreOptions) -> Result<()> {
        let source = normalize(source)?;
        let destination = normalize(destination)?;
        self.remote.move_file(&source, &destination, options)?;

        if self.is_cached(&source) {
            let moved = self.cache.move_file(&source, &destination, options);
            if moved.is_err() {
                self.evict_stale(&source);
                self.evict_stale(&destination);
            }
            moved
        } else {
            self.evict_stale(&destination);
            Ok(())
        }
    }

    fn copy(&self, source: &str, destination: &str, options: &StoreOptions) -> Result<()> {
        let source = normalize(source)?;
        let destination = normalize(destination)?;
        self.remote.copy(&source, &destination, options)?;

        if self.is_cached(&source) {
            let copied = self.mirror_copy(&source, &destination);
            if copied.is_err() {
                self.evict_stale(&destination);
            }
            copied
        } else {
            self.evict_stale(&destination);
            Ok(())
        }
    }
}

impl CachedStore for CacheProxy {
    fn touch(&self, path: &str, timestamp: DateTime<Utc>) -> Result<()> {
        self.freshness.touch(&normalize(path)?, timestamp)
    }

    fn clear_cache_older_than(&self, threshold: DateTime<Utc>) -> Result<EvictionReport> {
        Evictor::new(&self.cache).clear_older_than(threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::atomic::is_temp_artifact;
    use chrono::{Duration, TimeZone};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        proxy: CacheProxy,
        remote: Arc<LocalStore>,
        cache: LocalStore,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let remote = Arc::new(LocalStore::new(dir.path().join("remote-root")).unwrap());
        let cache = LocalStore::new(dir.path().join("local-root")).unwrap();
        let proxy = CacheProxy::with_cache(remote.clone(), cache.clone());
        Fixture {
            _dir: dir,
            proxy,
            remote,
            cache,
        }
    }

    fn opts() -> StoreOptions {
        StoreOptions::default()
    }

    fn read_to_string(mut stream: ReadStream) -> String {
        let mut contents = String::new();
        stream.read_to_string(&mut contents).unwrap();
        contents
    }

    fn count_entries(store: &dyn Store) -> usize {
        store.list_contents("/", true).unwrap().count()
    }

    /// Yields its payload, then fails instead of reporting EOF
    struct StreamThatGoesWrong {
        payload: Option<&'static [u8]>,
    }

    impl Read for StreamThatGoesWrong {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.payload.take() {
                Some(data) => {
                    buf[..data.len()].copy_from_slice(data);
                    Ok(data.len())
                }
                None => Err(io::Error::other("Inner stream went wrong")),
            }
        }
    }

    /// Remote double backed by a local store that can refuse writes
    struct FailingStore {
        inner: LocalStore,
        refuse_writes: bool,
        streams_opened: AtomicUsize,
    }

    impl FailingStore {
        fn new(inner: LocalStore, refuse_writes: bool) -> Self {
            Self {
                inner,
                refuse_writes,
                streams_opened: AtomicUsize::new(0),
            }
        }

        fn refused(path: &str) -> StoreError {
            StoreError::Write {
                path: path.to_string(),
                source: io::Error::other("remote unavailable"),
            }
        }
    }

    impl Store for FailingStore {
        fn file_exists(&self, path: &str) -> Result<bool> {
            self.inner.file_exists(path)
        }

        fn read(&self, path: &str) -> Result<Vec<u8>> {
            self.inner.read(path)
        }

        fn read_stream(&self, path: &str) -> Result<ReadStream> {
            self.streams_opened.fetch_add(1, Ordering::SeqCst);
            self.inner.read_stream(path)
        }

        fn write(&self, path: &str, contents: &[u8], options: &StoreOptions) -> Result<()> {
            if self.refuse_writes {
                return Err(Self::refused(path));
            }
            self.inner.write(path, contents, options)
        }

        fn write_stream(
            &self,
            path: &str,
            contents: &mut dyn Read,
            options: &StoreOptions,
        ) -> Result<()> {
            if self.refuse_writes {
                return Err(Self::refused(path));
            }
            self.inner.write_stream(path, contents, options)
        }

        fn delete(&self, path: &str) -> Result<()> {
            self.inner.delete(path)
        }

        fn delete_directory(&self, path: &str) -> Result<()> {
            self.inner.delete_directory(path)
        }

        fn create_directory(&self, path: &str, options: &StoreOptions) -> Result<()> {
            self.inner.create_directory(path, options)
        }

        fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
            self.inner.set_visibility(path, visibility)
        }

        fn visibility(&self, path: &str) -> Result<FileAttributes> {
            self.inner.visibility(path)
        }

        fn mime_type(&self, path: &str) -> Result<FileAttributes> {
            self.inner.mime_type(path)
        }

        fn last_modified(&self, path: &str) -> Result<FileAttributes> {
            self.inner.last_modified(path)
        }

        fn file_size(&self, path: &str) -> Result<FileAttributes> {
            self.inner.file_size(path)
        }

        fn list_contents(&self, path: &str, deep: bool) -> Result<ListContents<'_>> {
            self.inner.list_contents(path, deep)
        }

        fn move_file(&self, source: &str, destination: &str, options: &StoreOptions) -> Result<()> {
            self.inner.move_file(source, destination, options)
        }

        fn copy(&self, source: &str, destination: &str, options: &StoreOptions) -> Result<()> {
            self.inner.copy(source, destination, options)
        }
    }

    fn failing_fixture(refuse_writes: bool) -> (TempDir, CacheProxy, Arc<FailingStore>, LocalStore) {
        let dir = TempDir::new().unwrap();
        let inner = LocalStore::new(dir.path().join("remote-root")).unwrap();
        let remote = Arc::new(FailingStore::new(inner, refuse_writes));
        let cache = LocalStore::new(dir.path().join("local-root")).unwrap();
        let proxy = CacheProxy::with_cache(remote.clone(), cache.clone());
        (dir, proxy, remote, cache)
    }

    fn temp_artifacts(cache: &LocalStore) -> usize {
        cache
            .list_contents("", true)
            .unwrap()
            .map(|entry| entry.unwrap())
            .filter(|entry| entry.is_file() && is_temp_artifact(entry.base_name()))
            .count()
    }

    #[test]
    fn test_writing_saves_a_local_copy() {
        let f = fixture();

        f.proxy.write("path.txt", b"contents", &opts()).unwrap();

        assert!(f.proxy.file_exists("path.txt").unwrap());
        assert_eq!(f.proxy.read("path.txt").unwrap(), b"contents");
        assert!(f.cache.file_exists("path.txt").unwrap());
        assert_eq!(f.cache.read("path.txt").unwrap(), b"contents");
        assert_eq!(f.remote.read("path.txt").unwrap(), b"contents");
    }

    #[test]
    fn test_write_stream_saves_a_local_copy() {
        let f = fixture();

        let mut stream: &[u8] = b"streamed contents";
        f.proxy
            .write_stream("nested/dir/path.txt", &mut stream, &opts())
            .unwrap();

        assert_eq!(f.cache.read("nested/dir/path.txt").unwrap(), b"streamed contents");
        assert_eq!(f.remote.read("nested/dir/path.txt").unwrap(), b"streamed contents");
    }

    #[test]
    fn test_write_replaces_cached_copy() {
        let f = fixture();
        f.proxy.write("path.txt", b"first", &opts()).unwrap();
        f.proxy.write("path.txt", b"second", &opts()).unwrap();

        assert_eq!(f.proxy.read("path.txt").unwrap(), b"second");
        assert_eq!(f.cache.read("path.txt").unwrap(), b"second");
    }

    #[test]
    fn test_stream_that_goes_wrong_doesnt_create_a_false_positive_local_file() {
        let f = fixture();
        let mut stream = StreamThatGoesWrong {
            payload: Some(b"contents"),
        };

        let err = f
            .proxy
            .write_stream("path.txt", &mut stream, &opts())
            .unwrap_err();

        assert!(matches!(err, StoreError::Stream { .. }));
        assert!(!f.cache.file_exists("path.txt").unwrap());
        assert_eq!(count_entries(&f.cache), 0);
    }

    #[test]
    fn test_stream_failure_drops_previously_cached_copy() {
        let f = fixture();
        f.proxy.write("path.txt", b"old", &opts()).unwrap();

        let mut stream = StreamThatGoesWrong {
            payload: Some(b"new"),
        };
        let err = f
            .proxy
            .write_stream("path.txt", &mut stream, &opts())
            .unwrap_err();
        assert!(matches!(err, StoreError::Stream { .. }));

        // The remote now holds a partial write; the old cached copy must not mask it
        assert!(!f.cache.file_exists("path.txt").unwrap());
        assert_eq!(f.proxy.read("path.txt").unwrap(), f.remote.read("path.txt").unwrap());
    }

    #[test]
    fn test_remote_write_failure_propagates_and_leaves_no_cache_entry() {
        let (_dir, proxy, remote, cache) = failing_fixture(true);
        cache.write("path.txt", b"stale", &opts()).unwrap();

        let err = proxy.write("path.txt", b"contents", &opts()).unwrap_err();
        assert!(err.to_string().contains("remote unavailable"));
        assert!(!cache.file_exists("path.txt").unwrap());
        assert!(!remote.file_exists("path.txt").unwrap());
        assert_eq!(temp_artifacts(&cache), 0);
    }

    #[test]
    fn test_remote_write_stream_failure_propagates_and_leaves_no_cache_entry() {
        let (_dir, proxy, remote, cache) = failing_fixture(true);
        cache.write("path.txt", b"stale", &opts()).unwrap();

        let mut stream: &[u8] = b"contents";
        let err = proxy
            .write_stream("path.txt", &mut stream, &opts())
            .unwrap_err();
        assert!(err.to_string().contains("remote unavailable"));
        assert!(!cache.file_exists("path.txt").unwrap());
        assert!(!remote.file_exists("path.txt").unwrap());
        assert_eq!(temp_artifacts(&cache), 0);
    }

    #[test]
    fn test_cache_commit_failure_after_remote_write_is_a_write_error() {
        let f = fixture();
        // A directory where the cached file would land makes the rename fail
        f.cache.create_directory("taken.txt/inner", &opts()).unwrap();

        let err = f.proxy.write("taken.txt", b"new", &opts()).unwrap_err();

        assert!(matches!(err, StoreError::Write { .. }));
        assert!(err.is_cache_population_failure());
        assert_eq!(f.remote.read("taken.txt").unwrap(), b"new");
        assert_eq!(f.proxy.read("taken.txt").unwrap(), b"new");
        assert_eq!(temp_artifacts(&f.cache), 0);
    }

    #[test]
    fn test_cache_directory_failure_keeps_remote_directory() {
        let f = fixture();
        f.cache.write("taken", b"a file, not a directory", &opts()).unwrap();

        assert!(f.proxy.create_directory("taken", &opts()).is_err());

        let remote_dirs: Vec<String> = f
            .remote
            .list_contents("", false)
            .unwrap()
            .map(|entry| entry.unwrap())
            .filter(|entry| entry.is_dir())
            .map(|entry| entry.path().to_string())
            .collect();
        assert_eq!(remote_dirs, vec!["taken"]);
    }

    #[test]
    fn test_uncacheable_read_stream_opens_remote_once() {
        let (_dir, proxy, remote, cache) = failing_fixture(false);
        remote.write("blocked/file.txt", b"remote data", &opts()).unwrap();
        cache.write("blocked", b"in the way", &opts()).unwrap();

        assert_eq!(
            read_to_string(proxy.read_stream("blocked/file.txt").unwrap()),
            "remote data"
        );
        assert_eq!(remote.streams_opened.load(Ordering::SeqCst), 1);
        assert_eq!(proxy.stats().population_failures, 1);
    }

    #[test]
    fn test_delete_reaches_remote_when_cache_delete_fails() {
        let f = fixture();
        f.remote.write("entry", b"remote", &opts()).unwrap();
        // A non-empty directory under the same name cannot be removed as a file
        f.cache.write("entry/child.txt", b"x", &opts()).unwrap();

        assert!(f.proxy.delete("entry").is_err());
        assert!(!f.remote.file_exists("entry").unwrap());
    }

    #[test]
    fn test_copy_of_cached_source_replaces_cached_destination_whole() {
        let f = fixture();
        f.proxy.write("src.txt", b"new contents", &opts()).unwrap();
        f.cache.write("dest.txt", b"old", &opts()).unwrap();

        f.proxy.copy("src.txt", "dest.txt", &opts()).unwrap();

        assert_eq!(f.cache.read("dest.txt").unwrap(), b"new contents");
        assert_eq!(f.remote.read("dest.txt").unwrap(), b"new contents");
        assert_eq!(temp_artifacts(&f.cache), 0);
    }

    #[test]
    fn test_hidden_tmp_named_files_are_not_purged() {
        let f = fixture();
        f.proxy.write(".session.tmp", b"user data", &opts()).unwrap();

        let report = f
            .proxy
            .purge_temp_artifacts(Utc::now() + Duration::seconds(5))
            .unwrap();

        assert_eq!(report.evicted, 0);
        assert!(f.cache.file_exists(".session.tmp").unwrap());
    }

    #[test]
    fn test_file_exists_reply_with_local_cache_first() {
        let f = fixture();
        f.proxy.write("path.txt", b"contents", &opts()).unwrap();
        assert!(f.proxy.file_exists("path.txt").unwrap());

        f.remote.delete("path.txt").unwrap();

        assert!(f.proxy.file_exists("path.txt").unwrap());
        assert_eq!(f.proxy.read("path.txt").unwrap(), b"contents");
    }

    #[test]
    fn test_read_saves_remote_read_and_caches_response() {
        let f = fixture();
        assert!(!f.proxy.file_exists("path.txt").unwrap());

        f.remote.write("path.txt", b"foobar", &opts()).unwrap();
        assert!(!f.cache.file_exists("path.txt").unwrap());
        assert!(f.proxy.file_exists("path.txt").unwrap());

        assert_eq!(f.proxy.read("path.txt").unwrap(), b"foobar");
        assert!(f.cache.file_exists("path.txt").unwrap());
        assert_eq!(f.cache.read("path.txt").unwrap(), b"foobar");

        f.remote.delete("path.txt").unwrap();

        assert!(f.proxy.file_exists("path.txt").unwrap());
        assert_eq!(f.proxy.read("path.txt").unwrap(), b"foobar");
    }

    #[test]
    fn test_read_stream_saves_remote_read_and_caches_response() {
        let f = fixture();
        assert!(!f.proxy.file_exists("path.txt").unwrap());

        f.remote.write("path.txt", b"foobar", &opts()).unwrap();
        assert!(!f.cache.file_exists("path.txt").unwrap());

        assert_eq!(read_to_string(f.proxy.read_stream("path.txt").unwrap()), "foobar");
        assert!(f.cache.file_exists("path.txt").unwrap());

        f.remote.delete("path.txt").unwrap();

        assert!(f.proxy.file_exists("path.txt").unwrap());
        assert_eq!(read_to_string(f.proxy.read_stream("path.txt").unwrap()), "foobar");
    }

    #[test]
    fn test_read_of_missing_path_fails_and_caches_nothing() {
        let f = fixture();
        assert!(f.proxy.read("missing.txt").unwrap_err().is_not_found());
        assert!(f.proxy.read_stream("missing.txt").err().unwrap().is_not_found());
        assert_eq!(count_entries(&f.cache), 0);
    }

    #[test]
    fn test_read_succeeds_when_caching_fails() {
        let f = fixture();
        f.remote.write("blocked/file.txt", b"remote data", &opts()).unwrap();
        // A plain file where the cache needs a directory
        f.cache.write("blocked", b"in the way", &opts()).unwrap();

        assert_eq!(f.proxy.read("blocked/file.txt").unwrap(), b"remote data");
        assert_eq!(
            read_to_string(f.proxy.read_stream("blocked/file.txt").unwrap()),
            "remote data"
        );
        assert_eq!(f.proxy.stats().population_failures, 2);
    }

    #[test]
    fn test_directory_creation_and_deletion_happen_on_both_places() {
        let f = fixture();
        assert_eq!(count_entries(&f.cache), 0);
        assert_eq!(count_entries(f.remote.as_ref()), 0);

        f.proxy.create_directory("foo", &opts()).unwrap();

        assert_eq!(count_entries(&f.cache), 1);
        assert_eq!(count_entries(f.remote.as_ref()), 1);

        f.proxy.delete_directory("foo").unwrap();

        assert_eq!(count_entries(&f.cache), 0);
        assert_eq!(count_entries(f.remote.as_ref()), 0);
    }

    #[test]
    fn test_delete_removes_from_both_and_is_idempotent() {
        let f = fixture();
        f.proxy.write("path.txt", b"contents", &opts()).unwrap();

        f.proxy.delete("path.txt").unwrap();
        assert!(!f.cache.file_exists("path.txt").unwrap());
        assert!(!f.remote.file_exists("path.txt").unwrap());
        assert!(!f.proxy.file_exists("path.txt").unwrap());

        f.proxy.delete("path.txt").unwrap();
    }

    #[test]
    fn test_list_contents_ignores_local_cache() {
        let f = fixture();
        f.cache.write("file0.txt", b"xyz", &opts()).unwrap();

        assert_eq!(count_entries(&f.proxy), 0);

        f.remote.write("file1.txt", b"foo", &opts()).unwrap();
        f.remote.write("file2.txt", b"bar", &opts()).unwrap();

        assert_eq!(count_entries(&f.proxy), 2);
    }

    #[test]
    fn test_last_modified_call_is_never_proxied() {
        let f = fixture();
        f.cache.write("file.txt", b"xyz", &opts()).unwrap();
        f.remote.write("file.txt", b"xyz", &opts()).unwrap();

        let err = f.proxy.last_modified("file.txt").unwrap_err();
        assert!(matches!(
            err,
            StoreError::Metadata {
                kind: MetadataKind::LastModified,
                ..
            }
        ));

        assert!(f.proxy.last_modified("uncached.txt").is_err());
    }

    #[test]
    fn test_on_file_size_calls_cache_replies_first() {
        let f = fixture();
        f.cache.write("file.txt", b"xyz", &opts()).unwrap();
        f.remote.write("file.txt", b"longer remote", &opts()).unwrap();

        assert_eq!(f.proxy.file_size("file.txt").unwrap().file_size, Some(3));

        f.remote.write("remote-only.txt", b"12345", &opts()).unwrap();
        assert_eq!(f.proxy.file_size("remote-only.txt").unwrap().file_size, Some(5));
    }

    #[test]
    fn test_metadata_comes_from_remote() {
        let f = fixture();
        f.cache.write("cache-only.json", b"{}", &opts()).unwrap();
        f.remote.write("doc.json", b"{}", &opts()).unwrap();

        assert_eq!(
            f.proxy.mime_type("doc.json").unwrap().mime_type.as_deref(),
            Some("application/json")
        );
        assert!(f.proxy.mime_type("cache-only.json").unwrap_err().is_not_found());
        assert!(f.proxy.visibility("cache-only.json").unwrap_err().is_not_found());
    }

    #[cfg(unix)]
    #[test]
    fn test_visibility_is_proxied_to_remote() {
        let f = fixture();
        f.proxy
            .write("secret.txt", b"x", &StoreOptions::with_visibility(Visibility::Private))
            .unwrap();
        assert_eq!(
            f.remote.visibility("secret.txt").unwrap().visibility,
            Some(Visibility::Private)
        );

        f.proxy.set_visibility("secret.txt", Visibility::Public).unwrap();
        assert_eq!(
            f.proxy.visibility("secret.txt").unwrap().visibility,
            Some(Visibility::Public)
        );
    }

    #[test]
    fn test_move_acts_on_remote_even_when_local_cache_is_empty() {
        let f = fixture();
        f.remote.write("file.txt", b"xyz", &opts()).unwrap();

        f.proxy.move_file("file.txt", "file2.txt", &opts()).unwrap();

        assert!(f.proxy.file_exists("file2.txt").unwrap());
        assert!(!f.proxy.file_exists("file.txt").unwrap());
        assert!(!f.cache.file_exists("file2.txt").unwrap());
    }

    #[test]
    fn test_copy_acts_on_remote_even_when_local_cache_is_empty() {
        let f = fixture();
        f.remote.write("file.txt", b"xyz", &opts()).unwrap();

        f.proxy.copy("file.txt", "file2.txt", &opts()).unwrap();

        assert!(f.proxy.file_exists("file2.txt").unwrap());
        assert!(f.proxy.file_exists("file.txt").unwrap());
        assert!(!f.cache.file_exists("file2.txt").unwrap());
    }

    #[test]
    fn test_move_and_copy_mirror_cached_sources() {
        let f = fixture();
        f.proxy.write("a.txt", b"aaa", &opts()).unwrap();
        f.proxy.write("b.txt", b"bbb", &opts()).unwrap();

        f.proxy.move_file("a.txt", "moved/a.txt", &opts()).unwrap();
        f.proxy.copy("b.txt", "copied/b.txt", &opts()).unwrap();

        assert!(!f.cache.file_exists("a.txt").unwrap());
        assert_eq!(f.cache.read("moved/a.txt").unwrap(), b"aaa");
        assert_eq!(f.cache.read("b.txt").unwrap(), b"bbb");
        assert_eq!(f.cache.read("copied/b.txt").unwrap(), b"bbb");
        assert_eq!(f.remote.read("moved/a.txt").unwrap(), b"aaa");
        assert_eq!(f.remote.read("copied/b.txt").unwrap(), b"bbb");
    }

    #[test]
    fn test_copy_over_cached_destination_drops_stale_copy() {
        let f = fixture();
        f.proxy.write("dest.txt", b"old", &opts()).unwrap();
        f.remote.write("src.txt", b"new", &opts()).unwrap();

        f.proxy.copy("src.txt", "dest.txt", &opts()).unwrap();

        assert!(!f.cache.file_exists("dest.txt").unwrap());
        assert_eq!(f.proxy.read("dest.txt").unwrap(), b"new");
    }

    #[test]
    fn test_clear_cache_older_than() {
        let f = fixture();

        let new = Utc.with_ymd_and_hms(2021, 12, 1, 0, 0, 0).unwrap();
        let old = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let limit = new - Duration::days(1);

        let file1 = "file1.txt";
        let file2 = "subfolder/file2.txt";
        let file3 = "subfolder/file3.txt";
        let file4 = "file4.txt";

        f.proxy.write(file1, b"bar", &opts()).unwrap();
        f.proxy.write(file2, b"foo", &opts()).unwrap();
        f.proxy.write(file3, b"baz", &opts()).unwrap();
        f.proxy.write(file4, b"xyz", &opts()).unwrap();

        f.proxy.touch(file1, limit).unwrap();
        f.proxy.touch(file2, old).unwrap();
        f.proxy.touch(file3, new).unwrap();
        f.proxy.touch(file4, limit - Duration::days(1)).unwrap();

        let report = f.proxy.clear_cache_older_than(limit).unwrap();
        assert_eq!(report.evicted, 2);
        assert_eq!(report.failed, 0);

        for path in [file1, file2, file3, file4] {
            assert!(f.proxy.file_exists(path).unwrap());
        }

        assert!(f.cache.file_exists(file1).unwrap());
        assert!(!f.cache.file_exists(file2).unwrap());
        assert!(f.cache.file_exists(file3).unwrap());
        assert!(!f.cache.file_exists(file4).unwrap());

        assert_eq!(f.proxy.read(file2).unwrap(), b"foo");
        assert_eq!(f.proxy.read(file4).unwrap(), b"xyz");
    }

    #[test]
    fn test_read_refreshes_cache_timestamp() {
        let f = fixture();
        let old = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let old_path = "subfolder/old.txt";

        f.proxy.write(old_path, b"foo", &opts()).unwrap();
        f.proxy.touch(old_path, old).unwrap();

        assert!(f.proxy.file_exists(old_path).unwrap());
        assert_eq!(f.proxy.read(old_path).unwrap(), b"foo");

        f.proxy.clear_cache_older_than(old + Duration::days(1)).unwrap();

        assert!(f.proxy.file_exists(old_path).unwrap());
        assert!(f.cache.file_exists(old_path).unwrap());
    }

    #[test]
    fn test_read_stream_refreshes_cache_timestamp() {
        let f = fixture();
        let old = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let old_path = "subfolder/old.txt";

        f.proxy.write(old_path, b"foo", &opts()).unwrap();
        f.proxy.touch(old_path, old).unwrap();

        assert_eq!(read_to_string(f.proxy.read_stream(old_path).unwrap()), "foo");

        f.proxy.clear_cache_older_than(old + Duration::days(1)).unwrap();

        assert!(f.proxy.file_exists(old_path).unwrap());
        assert!(f.cache.file_exists(old_path).unwrap());
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let f = fixture();
        f.remote.write("path.txt", b"foobar", &opts()).unwrap();

        f.proxy.read("path.txt").unwrap();
        f.proxy.read("path.txt").unwrap();
        f.proxy.read("path.txt").unwrap();

        let stats = f.proxy.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.population_failures, 0);
    }

    #[test]
    fn test_paths_are_normalized_before_routing() {
        let f = fixture();
        f.proxy.write("/dir//file.txt", b"x", &opts()).unwrap();

        assert!(f.cache.file_exists("dir/file.txt").unwrap());
        assert!(f.proxy.file_exists("dir/./file.txt").unwrap());
        assert!(matches!(
            f.proxy.read("../escape.txt"),
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_concurrent_readers_of_uncached_path() {
        let f = fixture();
        f.remote.write("shared.txt", b"shared contents", &opts()).unwrap();
        let proxy = Arc::new(f.proxy);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let proxy = Arc::clone(&proxy);
                std::thread::spawn(move || proxy.read("shared.txt").unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), b"shared contents");
        }
        assert_eq!(f.cache.read("shared.txt").unwrap(), b"shared contents");
    }
}
