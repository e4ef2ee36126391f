//! Atomic cache writes
//!
//! Content is written to a temporary file next to its destination and only
//! renamed over the destination once every byte has been flushed to disk.
//! The temporary file lives in the destination's own directory so the rename
//! never crosses a filesystem boundary, where it would not be atomic.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::store::path::normalize;
use crate::store::{LocalStore, Operation, StoreError};

/// Prefix carried by every transaction's temporary file
pub const TEMP_PREFIX: &str = ".lcp-tx.";

/// Suffix carried by every transaction's temporary file
pub const TEMP_SUFFIX: &str = ".tmp";

/// Copy buffer size for streamed writes
const CHUNK_SIZE: usize = 64 * 1024;

/// Check whether a file name looks like a transaction's temporary file
pub fn is_temp_artifact(file_name: &str) -> bool {
    file_name.starts_with(TEMP_PREFIX) && file_name.ends_with(TEMP_SUFFIX)
}

/// A pending write to the local cache
///
/// Dropping an uncommitted transaction deletes its temporary file, so an
/// aborted write never leaves anything visible under the destination name.
pub struct AtomicWriteTransaction {
    /// Store path being written
    path: String,
    /// Final location of the file
    destination: PathBuf,
    /// Temporary file receiving the content
    temp: NamedTempFile,
    /// Bytes written so far
    written: u64,
}

impl AtomicWriteTransaction {
    /// Start a transaction targeting `path` in the cache store
    ///
    /// Creates the destination's parent directory if it is missing.
    pub fn begin(cache: &LocalStore, path: &str) -> Result<Self, StoreError> {
        let path = normalize(path)?;
        if path.is_empty() {
            return Err(StoreError::InvalidPath("cannot write to the store root".to_string()));
        }
        let destination = cache.location(&path)?;

        let parent = destination
            .parent()
            .ok_or_else(|| StoreError::InvalidPath(path.clone()))?
            .to_path_buf();
        let file_name = destination
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| StoreError::InvalidPath(path.clone()))?;

        std::fs::create_dir_all(&parent)
            .map_err(|e| StoreError::from_io(&path, Operation::CreateDirectory, e))?;

        let temp = tempfile::Builder::new()
            .prefix(&format!("{}{}.", TEMP_PREFIX, file_name))
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&parent)
            .map_err(|e| StoreError::Write {
                path: path.clone(),
                source: e,
            })?;

        debug!(path = %path, temp = %temp.path().display(), "Began cache write");

        Ok(Self {
            path,
            destination,
            temp,
            written: 0,
        })
    }

    /// Store path this transaction will publish
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Append a chunk
    pub fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StoreError> {
        self.temp
            .as_file_mut()
            .write_all(chunk)
            .map_err(|e| self.write_error(e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Write a whole buffer and commit
    pub fn write_all(mut self, contents: &[u8]) -> Result<u64, StoreError> {
        self.write_chunk(contents)?;
        self.commit()
    }

    /// Drain `reader` into the transaction without committing
    ///
    /// Errors raised by `reader` come back as [`StoreError::Read`]; errors
    /// writing the temporary file come back as [`StoreError::Write`].
    pub fn copy_from(&mut self, reader: &mut dyn Read) -> Result<u64, StoreError> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut copied = 0u64;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(StoreError::Read {
                        path: self.path.clone(),
                        source: e,
                    })
                }
            };
            self.write_chunk(&buf[..n])?;
            copied += n as u64;
        }
        Ok(copied)
    }

    /// Flush the content to disk and rename it over the destination
    ///
    /// Any file previously at the destination is replaced.
    pub fn commit(self) -> Result<u64, StoreError> {
        let Self {
            path,
            destination,
            mut temp,
            written,
        } = self;

        let synced = temp
            .as_file_mut()
            .flush()
            .and_then(|_| temp.as_file().sync_all());
        if let Err(e) = synced {
            return Err(StoreError::Write { path, source: e });
        }

        temp.persist(&destination).map_err(|e| StoreError::Write {
            path: path.clone(),
            source: e.error,
        })?;

        debug!(path = %path, size = written, "Committed cache write");
        Ok(written)
    }

    /// Discard the transaction and delete its temporary file
    pub fn abort(self) {
        debug!(path = %self.path, written = self.written, "Aborted cache write");
        // NamedTempFile removes the file on drop
    }

    fn write_error(&self, source: io::Error) -> StoreError {
        StoreError::Write {
            path: self.path.clone(),
            source,
        }
    }
}
