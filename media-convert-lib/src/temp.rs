//! Scoped temporary files and directories
//!
//! A [`TempResource`] is created right before a conversion step needs it and
//! is deleted exactly once: either by an explicit [`TempResource::release`]
//! or, on any other exit path (early return, error, dropped future), by its
//! `Drop` impl. Deletion errors are logged and swallowed so that cleaning up
//! one resource never prevents cleaning up its siblings.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, TempPath};

use crate::error::{ConversionError, Result};

/// What a temp resource holds on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempKind {
    File,
    Directory,
}

impl fmt::Display for TempKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TempKind::File => f.write_str("file"),
            TempKind::Directory => f.write_str("directory"),
        }
    }
}

enum Handle {
    File(TempPath),
    Directory(TempDir),
}

/// A uniquely named file or directory owned by a single request
pub struct TempResource {
    path: PathBuf,
    kind: TempKind,
    handle: Option<Handle>,
}

impl TempResource {
    /// Create a uniquely named file or directory under `root`.
    ///
    /// The name is `<prefix><random><suffix>`. Fails with a `Resource` error
    /// if the filesystem refuses the creation.
    pub fn acquire(root: &Path, kind: TempKind, prefix: &str, suffix: &str) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix).suffix(suffix);

        let handle = match kind {
            TempKind::File => builder
                .tempfile_in(root)
                .map(|file| Handle::File(file.into_temp_path())),
            TempKind::Directory => builder.tempdir_in(root).map(Handle::Directory),
        }
        .map_err(|e| {
            ConversionError::resource(
                format!("creating temp {} in {}", kind, root.display()),
                e,
            )
        })?;

        let path = match &handle {
            Handle::File(p) => p.to_path_buf(),
            Handle::Directory(d) => d.path().to_path_buf(),
        };

        tracing::debug!(path = %path.display(), %kind, "temp resource acquired");

        Ok(Self {
            path,
            kind,
            handle: Some(handle),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> TempKind {
        self.kind
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }

    /// Delete the resource (recursively for directories).
    ///
    /// Returns `true` if this call performed the release, `false` if it had
    /// already been released. Never fails: deletion errors are logged.
    pub fn release(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            tracing::debug!(path = %self.path.display(), "temp resource already released");
            return false;
        };

        let result = match handle {
            Handle::File(p) => p.close(),
            Handle::Directory(d) => d.close(),
        };

        match result {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), kind = %self.kind, "temp resource released");
            }
            // Some tools remove or rename their input; nothing left to clean up
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "temp resource was already gone");
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    kind = %self.kind,
                    error = %e,
                    "failed to delete temp resource"
                );
            }
        }
        true
    }
}

impl fmt::Debug for TempResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TempResource")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("released", &self.is_released())
            .finish()
    }
}

impl Drop for TempResource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_file_naming() {
        let root = tempfile::tempdir().unwrap();
        let res = TempResource::acquire(root.path(), TempKind::File, "audio_input", ".mp3").unwrap();

        let name = res.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("audio_input"));
        assert!(name.ends_with(".mp3"));
        assert!(res.path().is_file());
        assert_eq!(res.kind(), TempKind::File);
    }

    #[test]
    fn test_unique_names() {
        let root = tempfile::tempdir().unwrap();
        let a = TempResource::acquire(root.path(), TempKind::File, "x", ".tmp").unwrap();
        let b = TempResource::acquire(root.path(), TempKind::File, "x", ".tmp").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_release_twice_is_noop() {
        let root = tempfile::tempdir().unwrap();
        let mut res = TempResource::acquire(root.path(), TempKind::File, "in", ".tmp").unwrap();
        let path = res.path().to_path_buf();

        assert!(res.release());
        assert!(!path.exists());
        assert!(res.is_released());

        assert!(!res.release());
        drop(res);
        assert!(!path.exists());
    }

    #[test]
    fn test_directory_released_recursively() {
        let root = tempfile::tempdir().unwrap();
        let mut res =
            TempResource::acquire(root.path(), TempKind::Directory, "document_conversion_", "")
                .unwrap();
        let dir = res.path().to_path_buf();
        std::fs::create_dir(dir.join("nested")).unwrap();
        std::fs::write(dir.join("nested").join("out.pdf"), b"%PDF").unwrap();
        std::fs::write(dir.join("out.odt"), b"odt").unwrap();

        assert!(res.release());
        assert!(!dir.exists());
    }

    #[test]
    fn test_drop_releases() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let res = TempResource::acquire(root.path(), TempKind::File, "out", ".wav").unwrap();
            res.path().to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_release_after_external_delete() {
        let root = tempfile::tempdir().unwrap();
        let mut res = TempResource::acquire(root.path(), TempKind::File, "in", ".tmp").unwrap();
        std::fs::remove_file(res.path()).unwrap();
        assert!(res.release());
    }

    #[test]
    fn test_acquire_in_missing_root_fails() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("does-not-exist");
        let err = TempResource::acquire(&missing, TempKind::File, "in", ".tmp").unwrap_err();
        assert_eq!(err.kind(), "resource");
    }
}
