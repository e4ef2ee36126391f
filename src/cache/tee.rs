//! Stream tee for write-through caching
//!
//! Wraps the stream a client hands to `write_stream`. The remote store reads
//! from the tee as usual, and every chunk it pulls is first appended to an
//! [`AtomicWriteTransaction`] on the local cache. Nothing is buffered beyond
//! the chunk in flight.

use std::io::{self, Read};

use tracing::{trace, warn};

use super::atomic::AtomicWriteTransaction;
use crate::store::StoreError;

/// Reader that mirrors everything it yields into a cache transaction
pub struct TeeReader<R> {
    /// Store path being written
    path: String,
    /// Client-supplied content
    inner: R,
    /// Cache transaction receiving a copy of each chunk
    mirror: Option<AtomicWriteTransaction>,
    /// Why mirroring stopped, if it did
    mirror_error: Option<StoreError>,
    /// Error raised by the client stream
    source_error: Option<io::Error>,
    /// Whether the client stream reached EOF
    finished: bool,
    /// Bytes handed downstream
    forwarded: u64,
}

impl<R: Read> TeeReader<R> {
    /// Tee `inner` into `mirror`
    pub fn new(inner: R, mirror: AtomicWriteTransaction) -> Self {
        Self {
            path: mirror.path().to_string(),
            inner,
            mirror: Some(mirror),
            mirror_error: None,
            source_error: None,
            finished: false,
            forwarded: 0,
        }
    }

    /// Pass `inner` through unmirrored because the cache transaction could not start
    pub fn without_mirror(path: &str, inner: R, reason: StoreError) -> Self {
        Self {
            path: path.to_string(),
            inner,
            mirror: None,
            mirror_error: Some(reason),
            source_error: None,
            finished: false,
            forwarded: 0,
        }
    }

    /// Bytes handed downstream so far
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    /// Settle the mirror after the downstream write succeeded
    ///
    /// Commits the cache transaction when the whole stream was consumed and
    /// mirrored. Returns `Ok(None)` when the downstream stopped reading before
    /// EOF, in which case nothing is cached.
    pub fn finish(mut self) -> Result<Option<u64>, StoreError> {
        if let Some(source) = self.source_error.take() {
            return Err(StoreError::Stream {
                path: self.path,
                source,
            });
        }
        if let Some(err) = self.mirror_error.take() {
            return Err(err);
        }

        let Some(mirror) = self.mirror.take() else {
            return Ok(None);
        };
        if !self.finished {
            warn!(
                path = %self.path,
                forwarded = self.forwarded,
                mirrored = mirror.written(),
                "Stream not fully consumed, discarding cache copy"
            );
            mirror.abort();
            return Ok(None);
        }

        mirror.commit().map(Some)
    }

    /// Pick the error to report after the downstream write failed
    ///
    /// A failure of the client stream wins over whatever the downstream made
    /// of it. The cache transaction is discarded either way.
    pub fn into_error(mut self, downstream: StoreError) -> StoreError {
        if let Some(mirror) = self.mirror.take() {
            mirror.abort();
        }
        match self.source_error.take() {
            Some(source) => StoreError::Stream {
                path: self.path,
                source,
            },
            None => downstream,
        }
    }
}

impl<R: Read> Read for TeeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(0) => {
                self.finished = !buf.is_empty() || self.finished;
                Ok(0)
            }
            Ok(n) => {
                if let Some(mirror) = self.mirror.as_mut() {
                    if let Err(e) = mirror.write_chunk(&buf[..n]) {
                        warn!(path = %self.path, error = %e, "Cache mirror failed, continuing without it");
                        if let Some(mirror) = self.mirror.take() {
                            mirror.abort();
                        }
                        self.mirror_error = Some(e);
                    }
                }
                self.forwarded += n as u64;
                trace!(path = %self.path, chunk = n, total = self.forwarded, "Tee forwarded chunk");
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                warn!(path = %self.path, error = %e, "Source stream failed mid-transfer");
                let downstream = io::Error::new(e.kind(), e.to_string());
                self.source_error = Some(e);
                if let Some(mirror) = self.mirror.take() {
                    mirror.abort();
                }
                Err(downstream)
            }
        }
    }
}
