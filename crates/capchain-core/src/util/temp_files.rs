//! Unique temporary output paths for external capture tools
//!
//! External screenshot tools hand their image back through a file. Each
//! invocation gets its own path under `<temp root>/capchain/`, named
//! `capchain-<timestamp>-<uuid>.png`. The file is deliberately *not* created
//! up front (some tools refuse to overwrite, others rename on collision), and
//! the [`TempCapturePath`] guard removes it when dropped, whatever the outcome.
//!
//! # Examples
//!
//! ```
//! use capchain_core::util::temp_files::TempCapturePath;
//!
//! let path = TempCapturePath::new_in(std::env::temp_dir(), "png").unwrap();
//! assert!(!path.exists());
//! std::fs::write(path.path(), b"data").unwrap();
//! let owned = path.path().to_path_buf();
//! drop(path);
//! assert!(!owned.exists());
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::Utc;
use uuid::Uuid;

use crate::error::CaptureResult;

/// Subdirectory created beneath the temp root
pub const TEMP_SUBDIR: &str = "capchain";

/// Owned, not-yet-existing output path that is deleted on drop
#[derive(Debug)]
pub struct TempCapturePath {
    path: PathBuf,
}

impl TempCapturePath {
    /// Allocates a unique path below the system temp directory
    pub fn new(extension: &str) -> CaptureResult<Self> {
        Self::new_in(std::env::temp_dir(), extension)
    }

    /// Allocates a unique path below `root`
    ///
    /// Creates `<root>/capchain/` if needed.
    pub fn new_in(root: impl AsRef<Path>, extension: &str) -> CaptureResult<Self> {
        let dir = root.as_ref().join(TEMP_SUBDIR);
        fs::create_dir_all(&dir)?;

        let timestamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
        let name = format!("capchain-{}-{}.{}", timestamp, Uuid::new_v4().simple(), extension);

        Ok(Self {
            path: dir.join(name),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Size of the file written so far, or `None` if nothing was written
    pub fn written_len(&self) -> Option<u64> {
        fs::metadata(&self.path).ok().map(|meta| meta.len())
    }
}

impl Drop for TempCapturePath {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed temp capture file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!("Failed to remove temp capture file {}: {}", self.path.display(), e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_unique() {
        let root = tempfile::tempdir().unwrap();
        let a = TempCapturePath::new_in(root.path(), "png").unwrap();
        let b = TempCapturePath::new_in(root.path(), "png").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_path_layout() {
        let root = tempfile::tempdir().unwrap();
        let path = TempCapturePath::new_in(root.path(), "png").unwrap();

        assert_eq!(path.path().parent().unwrap(), root.path().join(TEMP_SUBDIR));
        let name = path.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("capchain-"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn test_not_created_up_front() {
        let root = tempfile::tempdir().unwrap();
        let path = TempCapturePath::new_in(root.path(), "png").unwrap();
        assert!(!path.exists());
        assert_eq!(path.written_len(), None);
    }

    #[test]
    fn test_drop_removes_written_file() {
        let root = tempfile::tempdir().unwrap();
        let path = TempCapturePath::new_in(root.path(), "png").unwrap();
        fs::write(path.path(), b"png").unwrap();
        assert_eq!(path.written_len(), Some(3));

        let owned = path.path().to_path_buf();
        drop(path);
        assert!(!owned.exists());
    }

    #[test]
    fn test_drop_tolerates_missing_file() {
        let root = tempfile::tempdir().unwrap();
        let path = TempCapturePath::new_in(root.path(), "png").unwrap();
        drop(path);
    }
}
