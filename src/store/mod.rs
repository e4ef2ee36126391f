//! Store capability abstraction
//!
//! A [`Store`] is a file-storage backend exposing existence checks, buffered
//! and streamed reads and writes, deletes, directories, move/copy, metadata and
//! listing. The cache proxy both consumes stores (local cache, remote) and
//! implements one.

pub mod errors;
pub mod local;
pub mod path;
pub mod types;

pub use errors::{MetadataKind, Operation, StoreError};
pub use local::LocalStore;
pub use path::PathPrefixer;
pub use types::{
    DirectoryAttributes, FileAttributes, StorageAttributes, StoreOptions, Visibility,
};

use std::io::Read;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Lazy sequence of listing entries
pub type ListContents<'a> = Box<dyn Iterator<Item = Result<StorageAttributes>> + Send + 'a>;

/// Readable content stream
pub type ReadStream = Box<dyn Read + Send>;

/// File-storage backend
///
/// All operations are synchronous and run to completion on the caller's
/// thread. Paths are slash-separated and relative to the store root.
pub trait Store: Send + Sync {
    /// Check whether a file exists at `path`
    fn file_exists(&self, path: &str) -> Result<bool>;

    /// Read a whole file into memory
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Open a file for streaming reads
    fn read_stream(&self, path: &str) -> Result<ReadStream>;

    /// Write a whole buffer to `path`, replacing any existing file
    fn write(&self, path: &str, contents: &[u8], options: &StoreOptions) -> Result<()>;

    /// Write everything `contents` yields to `path`, replacing any existing file
    fn write_stream(
        &self,
        path: &str,
        contents: &mut dyn Read,
        options: &StoreOptions,
    ) -> Result<()>;

    /// Delete a file. Deleting a missing file is not an error.
    fn delete(&self, path: &str) -> Result<()>;

    /// Delete a directory and everything below it
    fn delete_directory(&self, path: &str) -> Result<()>;

    /// Create a directory, including missing parents
    fn create_directory(&self, path: &str, options: &StoreOptions) -> Result<()>;

    /// Change a file's visibility
    fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()>;

    /// Get a file's visibility
    fn visibility(&self, path: &str) -> Result<FileAttributes>;

    /// Get a file's MIME type
    fn mime_type(&self, path: &str) -> Result<FileAttributes>;

    /// Get a file's modification time
    fn last_modified(&self, path: &str) -> Result<FileAttributes>;

    /// Get a file's size
    fn file_size(&self, path: &str) -> Result<FileAttributes>;

    /// List entries below `path`, recursing into subdirectories when `deep`
    fn list_contents(&self, path: &str, deep: bool) -> Result<ListContents<'_>>;

    /// Move a file
    fn move_file(&self, source: &str, destination: &str, options: &StoreOptions) -> Result<()>;

    /// Copy a file
    fn copy(&self, source: &str, destination: &str, options: &StoreOptions) -> Result<()>;
}
