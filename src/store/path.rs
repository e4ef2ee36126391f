//! Path normalization and prefixing
//!
//! Store paths are slash-separated and relative to the store root. The empty
//! string is the root itself.

use std::path::{Path, PathBuf};

use super::StoreError;

/// Normalize a store path
///
/// Backslashes become slashes, empty and `.` segments are dropped and `..`
/// pops the previous segment. Paths that climb above the root or contain
/// control characters are rejected.
pub fn normalize(path: &str) -> Result<String, StoreError> {
    if path.chars().any(|c| c.is_control()) {
        return Err(StoreError::InvalidPath(path.escape_debug().to_string()));
    }

    let unified = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(StoreError::InvalidPath(path.to_string()));
                }
            }
            other => segments.push(other),
        }
    }

    Ok(segments.join("/"))
}

/// Maps store paths onto a filesystem root
#[derive(Debug, Clone)]
pub struct PathPrefixer {
    /// Filesystem root all store paths live under
    root: PathBuf,
}

impl PathPrefixer {
    /// Create a prefixer for a filesystem root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Filesystem root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of an already-normalized store path
    pub fn prefix_path(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            return self.root.clone();
        }
        path.split('/')
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }

    /// Store path of a location under the root
    ///
    /// Returns `None` for locations outside the root or that are not valid
    /// UTF-8.
    pub fn strip_prefix(&self, location: &Path) -> Option<String> {
        let relative = location.strip_prefix(&self.root).ok()?;
        let mut segments = Vec::new();
        for component in relative.components() {
            segments.push(component.as_os_str().to_str()?);
        }
        Some(segments.join("/"))
    }
}
