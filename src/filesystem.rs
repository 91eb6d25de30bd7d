//! Filesystem collaborator used by preflight checks and cleanup
//!
//! The coordinator only touches the disk through [`Filesystem`], so tests can swap in
//! a fake that simulates full disks or read-only folders.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::utils;

/// Disk operations needed by the coordinator
///
/// All methods are synchronous and expected to be fast local operations.
pub trait Filesystem: Send + Sync {
    /// Whether files can be created in `dir`
    ///
    /// Performs blocking I/O on the calling thread: a missing `dir` (and its parents)
    /// is created, and a scratch file is created and removed inside it. A directory
    /// created here is left in place even when the probe fails.
    fn can_write(&self, dir: &Path) -> bool;

    /// Bytes available to the current user on the volume holding `dir`
    fn available_bytes(&self, dir: &Path) -> std::io::Result<u64>;

    /// Collision-free path for a file named after `base` with extension `ext`
    ///
    /// `base` is sanitized first. On collision " (1)", " (2)", ... is appended.
    fn unique_name(&self, dir: &Path, base: &str, ext: &str) -> Result<PathBuf>;

    /// Delete `path` if it exists; returns whether a file was removed
    fn delete_if_exists(&self, path: &Path) -> std::io::Result<bool>;

    /// Delete the engine's temporary files for `stem` in `dir`; returns how many were removed
    ///
    /// Best effort: failures are logged and skipped.
    fn delete_partial_files(&self, dir: &Path, stem: &str) -> usize;
}

/// [`Filesystem`] backed by the local disk
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    /// Create a local filesystem handle
    pub fn new() -> Self {
        Self
    }
}

impl Filesystem for LocalFilesystem {
    fn can_write(&self, dir: &Path) -> bool {
        utils::probe_writable(dir)
    }

    fn available_bytes(&self, dir: &Path) -> std::io::Result<u64> {
        // statvfs needs an existing path; fall back to the nearest existing ancestor
        let existing = dir
            .ancestors()
            .find(|p| p.exists())
            .unwrap_or(dir);
        utils::get_available_space(existing)
    }

    fn unique_name(&self, dir: &Path, base: &str, ext: &str) -> Result<PathBuf> {
        utils::get_unique_path(dir, &utils::sanitize_filename(base), ext)
    }

    fn delete_if_exists(&self, path: &Path) -> std::io::Result<bool> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn delete_partial_files(&self, dir: &Path, stem: &str) -> usize {
        let candidates = match utils::find_partial_files(dir, stem) {
            Ok(candidates) => candidates,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Failed to scan for partial files");
                return 0;
            }
        };

        let mut deleted = 0;
        for path in candidates {
            match self.delete_if_exists(&path) {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to delete partial file")
                }
            }
        }
        deleted
    }
}
