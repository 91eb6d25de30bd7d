//! Bounded download history
//!
//! The ledger keeps the five most recent finished downloads, newest first, and
//! rewrites its JSON snapshot on every mutation:
//!
//! ```json
//! { "version": 1, "entries": [ { "id": "...", "title": "...", "path": "...",
//!   "status": "completed", "format": "video", "completed_at": "2026-01-01T12:00:00Z" } ] }
//! ```
//!
//! In-memory entries change only after the snapshot was written, so a failed write
//! leaves both the file and the ledger as they were.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::HistoryEntry;
use crate::utils::write_json_atomic;

/// Maximum number of entries kept
pub const HISTORY_CAPACITY: usize = 5;

/// Snapshot format version
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    entries: &'a VecDeque<HistoryEntry>,
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    #[serde(default)]
    entries: Vec<HistoryEntry>,
}

/// FIFO-evicting history of finished downloads
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: VecDeque<HistoryEntry>,
}

impl Ledger {
    /// Load the ledger from `path`
    ///
    /// A missing file yields an empty ledger. So does an unreadable, corrupt or
    /// unknown-version snapshot, which is logged and left in place until the next
    /// write replaces it.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Snapshot>(&bytes) {
                Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => {
                    let mut entries = snapshot.entries;
                    entries.truncate(HISTORY_CAPACITY);
                    entries.into()
                }
                Ok(snapshot) => {
                    tracing::warn!(
                        path = %path.display(),
                        version = snapshot.version,
                        "Unknown history snapshot version, starting empty"
                    );
                    VecDeque::new()
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Corrupt history snapshot, starting empty");
                    VecDeque::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => VecDeque::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read history snapshot, starting empty");
                VecDeque::new()
            }
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "History loaded");
        Self { path, entries }
    }

    /// Snapshot file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries, newest first
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert `entry` at the head and persist
    ///
    /// Returns the entry evicted from the tail, if the ledger was full.
    pub async fn append(&mut self, entry: HistoryEntry) -> Result<Option<HistoryEntry>> {
        let mut next = self.entries.clone();
        next.push_front(entry);
        let evicted = if next.len() > HISTORY_CAPACITY {
            next.pop_back()
        } else {
            None
        };

        self.persist(&next).await?;
        self.entries = next;
        Ok(evicted)
    }

    /// Remove all entries and persist
    pub async fn clear(&mut self) -> Result<()> {
        self.persist(&VecDeque::new()).await?;
        self.entries.clear();
        Ok(())
    }

    async fn persist(&self, entries: &VecDeque<HistoryEntry>) -> Result<()> {
        write_json_atomic(
            &self.path,
            &SnapshotRef {
                version: SNAPSHOT_VERSION,
                entries,
            },
        )
        .await
    }
}
