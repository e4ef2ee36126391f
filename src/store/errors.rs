//! Store Error Types
//!
//! Structured error handling for store operations.
//! Every variant carries the path it failed on so errors from the local cache
//! and the remote store can be told apart in logs.

use std::fmt;
use std::io;

/// Kind of metadata that could not be retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    FileSize,
    LastModified,
    MimeType,
    Visibility,
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetadataKind::FileSize => "file size",
            MetadataKind::LastModified => "last modified",
            MetadataKind::MimeType => "mime type",
            MetadataKind::Visibility => "visibility",
        };
        f.write_str(name)
    }
}

/// Operation being performed when an I/O error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Delete,
    CreateDirectory,
    DeleteDirectory,
    SetVisibility,
}

/// Store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Unable to read {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("Unable to write {path}: {source}")]
    Write { path: String, source: io::Error },

    #[error("Source stream failed while writing {path}: {source}")]
    Stream { path: String, source: io::Error },

    #[error("Unable to delete {path}: {source}")]
    Delete { path: String, source: io::Error },

    #[error("Unable to create directory {path}: {source}")]
    CreateDirectory { path: String, source: io::Error },

    #[error("Unable to delete directory {path}: {source}")]
    DeleteDirectory { path: String, source: io::Error },

    #[error("Unable to move {from} to {to}: {source}")]
    Move {
        from: String,
        to: String,
        source: io::Error,
    },

    #[error("Unable to copy {from} to {to}: {source}")]
    Copy {
        from: String,
        to: String,
        source: io::Error,
    },

    #[error("Unable to set visibility for {path}: {source}")]
    SetVisibility { path: String, source: io::Error },

    #[error("Unable to retrieve {kind} for {path}: {reason}")]
    Metadata {
        path: String,
        kind: MetadataKind,
        reason: String,
    },
}

impl StoreError {
    /// Map an I/O error raised during `op` on `path`
    ///
    /// `NotFound` kinds become [`StoreError::NotFound`] regardless of the
    /// operation, so callers can check for absence uniformly.
    pub fn from_io(path: &str, op: Operation, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            return StoreError::NotFound(path.to_string());
        }

        let path = path.to_string();
        match op {
            Operation::Read => StoreError::Read { path, source: err },
            Operation::Write => StoreError::Write { path, source: err },
            Operation::Delete => StoreError::Delete { path, source: err },
            Operation::CreateDirectory => StoreError::CreateDirectory { path, source: err },
            Operation::DeleteDirectory => StoreError::DeleteDirectory { path, source: err },
            Operation::SetVisibility => StoreError::SetVisibility { path, source: err },
        }
    }

    /// Create a metadata error
    pub fn metadata(path: &str, kind: MetadataKind, reason: impl Into<String>) -> Self {
        StoreError::Metadata {
            path: path.to_string(),
            kind,
            reason: reason.into(),
        }
    }

    /// Whether this error means the path does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Whether this error came from writing into the local side of a transfer
    ///
    /// The proxy uses this to tell a failed cache population apart from a
    /// failed remote read when materializing a cache entry.
    pub fn is_cache_population_failure(&self) -> bool {
        matches!(self, StoreError::Write { .. })
    }
}
