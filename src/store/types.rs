//! Store option and attribute types
//!
//! Defines the options passed through to stores and the attribute records
//! returned by metadata and listing calls.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// File or directory visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    /// Unix permission bits for a file with this visibility
    pub fn file_mode(self) -> u32 {
        match self {
            Visibility::Public => 0o644,
            Visibility::Private => 0o600,
        }
    }

    /// Unix permission bits for a directory with this visibility
    pub fn directory_mode(self) -> u32 {
        match self {
            Visibility::Public => 0o755,
            Visibility::Private => 0o700,
        }
    }

    /// Interpret permission bits, treating anything world-readable as public
    pub fn from_mode(mode: u32) -> Self {
        if mode & 0o004 != 0 {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => f.write_str("public"),
            Visibility::Private => f.write_str("private"),
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(format!("unknown visibility: {}", other)),
        }
    }
}

/// Options passed through unmodified to whichever store executes an operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreOptions {
    /// Visibility for written files
    #[serde(default)]
    pub visibility: Option<Visibility>,
    /// Visibility for directories created along the way
    #[serde(default)]
    pub directory_visibility: Option<Visibility>,
}

impl StoreOptions {
    /// Options with a file visibility hint
    pub fn with_visibility(visibility: Visibility) -> Self {
        Self {
            visibility: Some(visibility),
            ..Default::default()
        }
    }
}

/// Metadata for a file
///
/// Fields are optional because each metadata call only fills in what it was
/// asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAttributes {
    /// Path relative to the store root
    pub path: String,
    /// Size in bytes
    pub file_size: Option<u64>,
    /// Visibility
    pub visibility: Option<Visibility>,
    /// Modification time in seconds since epoch
    pub last_modified: Option<i64>,
    /// MIME type
    pub mime_type: Option<String>,
}

impl FileAttributes {
    /// Attributes with only the path set
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// Metadata for a directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryAttributes {
    /// Path relative to the store root
    pub path: String,
    /// Visibility
    pub visibility: Option<Visibility>,
    /// Modification time in seconds since epoch
    pub last_modified: Option<i64>,
}

/// A listing entry: either a file or a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageAttributes {
    File(FileAttributes),
    Directory(DirectoryAttributes),
}

impl StorageAttributes {
    /// Check if this entry is a file
    pub fn is_file(&self) -> bool {
        matches!(self, StorageAttributes::File(_))
    }

    /// Check if this entry is a directory
    pub fn is_dir(&self) -> bool {
        matches!(self, StorageAttributes::Directory(_))
    }

    /// Path relative to the store root
    pub fn path(&self) -> &str {
        match self {
            StorageAttributes::File(f) => &f.path,
            StorageAttributes::Directory(d) => &d.path,
        }
    }

    /// Get the base name (last component of path)
    pub fn base_name(&self) -> &str {
        let path = self.path();
        path.rsplit('/').next().unwrap_or(path)
    }

    /// Modification time in seconds since epoch, if known
    pub fn last_modified(&self) -> Option<i64> {
        match self {
            StorageAttributes::File(f) => f.last_modified,
            StorageAttributes::Directory(d) => d.last_modified,
        }
    }
}
