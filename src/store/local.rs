//! Local filesystem store
//!
//! A [`Store`] rooted at a directory on local disk. It backs the proxy's local
//! cache and, in tests and the CLI, stands in for the remote store as well.

use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};
use walkdir::WalkDir;

use super::path::{normalize, PathPrefixer};
use super::{
    DirectoryAttributes, FileAttributes, ListContents, MetadataKind, Operation, ReadStream,
    Result, StorageAttributes, Store, StoreError, StoreOptions, Visibility,
};

/// Filesystem-backed store
#[derive(Debug, Clone)]
pub struct LocalStore {
    /// Maps store paths onto the root directory
    prefixer: PathPrefixer,
}

impl LocalStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::CreateDirectory {
            path: root.display().to_string(),
            source: e,
        })?;

        info!(root = %root.display(), "Local store initialized");

        Ok(Self {
            prefixer: PathPrefixer::new(root),
        })
    }

    /// Root directory of this store
    pub fn root(&self) -> &Path {
        self.prefixer.root()
    }

    /// Filesystem location of a store path
    pub fn location(&self, path: &str) -> Result<PathBuf> {
        let normalized = normalize(path)?;
        Ok(self.prefixer.prefix_path(&normalized))
    }

    /// Set a file's modification time
    pub fn set_modified(&self, path: &str, time: SystemTime) -> Result<()> {
        let location = self.location(path)?;
        let file = File::options()
            .write(true)
            .open(&location)
            .map_err(|e| StoreError::from_io(path, Operation::Write, e))?;
        file.set_modified(time)
            .map_err(|e| StoreError::from_io(path, Operation::Write, e))?;
        Ok(())
    }

    /// Create the parent directory of `location`, applying a directory visibility
    fn ensure_parent(&self, path: &str, location: &Path, options: &StoreOptions) -> Result<()> {
        let Some(parent) = location.parent() else {
            return Ok(());
        };
        fs::create_dir_all(parent)
            .map_err(|e| StoreError::from_io(path, Operation::CreateDirectory, e))?;
        if let Some(visibility) = options.directory_visibility {
            if parent != self.root() {
                apply_mode(parent, visibility.directory_mode())
                    .map_err(|e| StoreError::from_io(path, Operation::SetVisibility, e))?;
            }
        }
        Ok(())
    }

    /// Metadata for an existing file, rejecting directories
    fn file_metadata(&self, path: &str, kind: MetadataKind) -> Result<Metadata> {
        let location = self.location(path)?;
        let metadata =
            fs::metadata(&location).map_err(|e| StoreError::from_io(path, Operation::Read, e))?;
        if !metadata.is_file() {
            return Err(StoreError::metadata(path, kind, "path is not a file"));
        }
        Ok(metadata)
    }

    /// Build a listing entry from a walked directory entry
    fn attributes_for(&self, entry: &walkdir::DirEntry) -> Result<StorageAttributes> {
        let path = self
            .prefixer
            .strip_prefix(entry.path())
            .ok_or_else(|| StoreError::InvalidPath(entry.path().display().to_string()))?;
        let metadata = entry
            .metadata()
            .map_err(|e| StoreError::from_io(&path, Operation::Read, io::Error::from(e)))?;

        let last_modified = metadata.modified().ok().map(unix_seconds);
        let visibility = Some(visibility_of(&metadata));

        if metadata.is_dir() {
            Ok(StorageAttributes::Directory(DirectoryAttributes {
                path,
                visibility,
                last_modified,
            }))
        } else {
            Ok(StorageAttributes::File(FileAttributes {
                path,
                file_size: Some(metadata.len()),
                visibility,
                last_modified,
                mime_type: None,
            }))
        }
    }
}

impl Store for LocalStore {
    fn file_exists(&self, path: &str) -> Result<bool> {
        let location = self.location(path)?;
        match fs::metadata(&location) {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::from_io(path, Operation::Read, e)),
        }
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let location = self.location(path)?;
        fs::read(&location).map_err(|e| StoreError::from_io(path, Operation::Read, e))
    }

    fn read_stream(&self, path: &str) -> Result<ReadStream> {
        let location = self.location(path)?;
        let file = File::open(&location).map_err(|e| StoreError::from_io(path, Operation::Read, e))?;
        Ok(Box::new(file))
    }

    fn write(&self, path: &str, contents: &[u8], options: &StoreOptions) -> Result<()> {
        let location = self.location(path)?;
        self.ensure_parent(path, &location, options)?;

        fs::write(&location, contents).map_err(|e| StoreError::Write {
            path: path.to_string(),
            source: e,
        })?;
        if let Some(visibility) = options.visibility {
            self.set_visibility(path, visibility)?;
        }

        debug!(path = path, size = contents.len(), "Wrote file");
        Ok(())
    }

    fn write_stream(
        &self,
        path: &str,
        contents: &mut dyn Read,
        options: &StoreOptions,
    ) -> Result<()> {
        let location = self.location(path)?;
        self.ensure_parent(path, &location, options)?;

        let mut file = File::create(&location).map_err(|e| StoreError::Write {
            path: path.to_string(),
            source: e,
        })?;
        let size = io::copy(contents, &mut file)
            .and_then(|size| file.flush().map(|_| size))
            .map_err(|e| StoreError::Write {
                path: path.to_string(),
                source: e,
            })?;
        if let Some(visibility) = options.visibility {
            self.set_visibility(path, visibility)?;
        }

        debug!(path = path, size = size, "Wrote file from stream");
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        let location = self.location(path)?;
        match fs::remove_file(&location) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::from_io(path, Operation::Delete, e)),
        }
    }

    fn delete_directory(&self, path: &str) -> Result<()> {
        let normalized = normalize(path)?;
        if normalized.is_empty() {
            return Err(StoreError::InvalidPath(
                "refusing to delete the store root".to_string(),
            ));
        }
        let location = self.prefixer.prefix_path(&normalized);
        match fs::remove_dir_all(&location) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::from_io(path, Operation::DeleteDirectory, e)),
        }
    }

    fn create_directory(&self, path: &str, options: &StoreOptions) -> Result<()> {
        let location = self.location(path)?;
        fs::create_dir_all(&location)
            .map_err(|e| StoreError::from_io(path, Operation::CreateDirectory, e))?;

        let visibility = options.directory_visibility.or(options.visibility);
        if let Some(visibility) = visibility {
            if location != self.root() {
                apply_mode(&location, visibility.directory_mode())
                    .map_err(|e| StoreError::from_io(path, Operation::SetVisibility, e))?;
            }
        }
        Ok(())
    }

    fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        let location = self.location(path)?;
        let metadata = fs::metadata(&location)
            .map_err(|e| StoreError::from_io(path, Operation::SetVisibility, e))?;
        let mode = if metadata.is_dir() {
            visibility.directory_mode()
        } else {
            visibility.file_mode()
        };
        apply_mode(&location, mode).map_err(|e| StoreError::from_io(path, Operation::SetVisibility, e))
    }

    fn visibility(&self, path: &str) -> Result<FileAttributes> {
        let metadata = self.file_metadata(path, MetadataKind::Visibility)?;
        Ok(FileAttributes {
            visibility: Some(visibility_of(&metadata)),
            ..FileAttributes::new(path)
        })
    }

    fn mime_type(&self, path: &str) -> Result<FileAttributes> {
        self.file_metadata(path, MetadataKind::MimeType)?;
        let mime = detect_mime_type(path).ok_or_else(|| {
            StoreError::metadata(path, MetadataKind::MimeType, "unknown file extension")
        })?;
        Ok(FileAttributes {
            mime_type: Some(mime.to_string()),
            ..FileAttributes::new(path)
        })
    }

    fn last_modified(&self, path: &str) -> Result<FileAttributes> {
        let metadata = self.file_metadata(path, MetadataKind::LastModified)?;
        let modified = metadata
            .modified()
            .map_err(|e| StoreError::metadata(path, MetadataKind::LastModified, e.to_string()))?;
        Ok(FileAttributes {
            last_modified: Some(unix_seconds(modified)),
            ..FileAttributes::new(path)
        })
    }

    fn file_size(&self, path: &str) -> Result<FileAttributes> {
        let metadata = self.file_metadata(path, MetadataKind::FileSize)?;
        Ok(FileAttributes {
            file_size: Some(metadata.len()),
            ..FileAttributes::new(path)
        })
    }

    fn list_contents(&self, path: &str, deep: bool) -> Result<ListContents<'_>> {
        let normalized = normalize(path)?;
        let location = self.prefixer.prefix_path(&normalized);

        if !location.is_dir() {
            return Ok(Box::new(std::iter::empty()));
        }

        let max_depth = if deep { usize::MAX } else { 1 };
        let walker = WalkDir::new(location)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter();

        Ok(Box::new(walker.map(move |entry| {
            let entry = entry.map_err(|e| {
                StoreError::from_io(&normalized, Operation::Read, io::Error::from(e))
            })?;
            self.attributes_for(&entry)
        })))
    }

    fn move_file(&self, source: &str, destination: &str, options: &StoreOptions) -> Result<()> {
        let from = self.location(source)?;
        let to = self.location(destination)?;
        if !from.is_file() {
            return Err(StoreError::NotFound(source.to_string()));
        }
        self.ensure_parent(destination, &to, options)?;

        fs::rename(&from, &to).map_err(|e| StoreError::Move {
            from: source.to_string(),
            to: destination.to_string(),
            source: e,
        })
    }

    fn copy(&self, source: &str, destination: &str, options: &StoreOptions) -> Result<()> {
        let from = self.location(source)?;
        let to = self.location(destination)?;
        if !from.is_file() {
            return Err(StoreError::NotFound(source.to_string()));
        }
        self.ensure_parent(destination, &to, options)?;

        fs::copy(&from, &to).map_err(|e| StoreError::Copy {
            from: source.to_string(),
            to: destination.to_string(),
            source: e,
        })?;
        if let Some(visibility) = options.visibility {
            self.set_visibility(destination, visibility)?;
        }
        Ok(())
    }
}

/// Seconds since epoch, negative for times before it
pub fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

#[cfg(unix)]
fn apply_mode(location: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(location, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn apply_mode(_location: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn visibility_of(metadata: &Metadata) -> Visibility {
    use std::os::unix::fs::PermissionsExt;
    Visibility::from_mode(metadata.permissions().mode())
}

#[cfg(not(unix))]
fn visibility_of(_metadata: &Metadata) -> Visibility {
    Visibility::Public
}

/// Guess a MIME type from the file extension
fn detect_mime_type(path: &str) -> Option<&'static str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let (_, extension) = name.rsplit_once('.')?;
    let mime = match extension.to_ascii_lowercase().as_str() {
        "txt" | "log" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "wasm" => "application/wasm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => return None,
    };
    Some(mime)
}
