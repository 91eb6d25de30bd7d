//! Core types for ydl-core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::download::Download;
use crate::validator::ValidatedUrl;

/// Unique identifier for a download
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadId(pub Uuid);

impl DownloadId {
    /// Create a new random DownloadId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn get(&self) -> Uuid {
        self.0
    }
}

impl Default for DownloadId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for DownloadId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for DownloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DownloadId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Output format of a download
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadFormat {
    /// MP4 with video and audio
    #[default]
    Video,
    /// Audio only, MP3
    Audio,
}

impl DownloadFormat {
    /// File extension of the final artifact
    pub fn extension(&self) -> &'static str {
        match self {
            DownloadFormat::Video => "mp4",
            DownloadFormat::Audio => "mp3",
        }
    }

    /// Lowercase name, as persisted
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadFormat::Video => "video",
            DownloadFormat::Audio => "audio",
        }
    }
}

/// Download status
///
/// See [`Download`] for the transition rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created, worker not started yet
    Pending,
    /// Worker accepted the job and is opening the connection
    Connecting,
    /// Stream open, bytes flowing
    Downloading,
    /// Post-processing (format conversion, merging)
    Processing,
    /// Finished successfully
    Completed,
    /// Cancelled by user
    Cancelled,
    /// Failed
    Error,
}

impl Status {
    /// Terminal statuses never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Cancelled | Status::Error)
    }

    /// Non-terminal statuses hold the single-flight slot
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Statuses during which progress may advance
    pub fn is_transferring(&self) -> bool {
        matches!(
            self,
            Status::Connecting | Status::Downloading | Status::Processing
        )
    }

    /// Whether `self -> next` is an ordinary state machine edge
    ///
    /// Restarting an attempt (back to `Connecting`) is not an ordinary edge; see
    /// [`Download::restart_attempt`].
    pub fn can_transition_to(&self, next: Status) -> bool {
        use Status::*;
        matches!(
            (self, next),
            (Pending, Connecting)
                | (Connecting, Downloading)
                | (Downloading, Processing)
                | (Downloading, Completed)
                | (Processing, Completed)
                | (Pending | Connecting | Downloading | Processing, Cancelled | Error)
        )
    }

    /// Lowercase name, as persisted
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Connecting => "connecting",
            Status::Downloading => "downloading",
            Status::Processing => "processing",
            Status::Completed => "completed",
            Status::Cancelled => "cancelled",
            Status::Error => "error",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated request ready to be handed to the coordinator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Source URL, already validated
    pub url: ValidatedUrl,
    /// Directory the artifact is written to
    pub destination_dir: PathBuf,
    /// Requested output format
    pub format: DownloadFormat,
}

impl DownloadRequest {
    /// Create a request
    pub fn new(url: ValidatedUrl, destination_dir: impl Into<PathBuf>, format: DownloadFormat) -> Self {
        Self {
            url,
            destination_dir: destination_dir.into(),
            format,
        }
    }
}

/// Progress snapshot delivered to the caller's progress callback
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Download ID
    pub id: DownloadId,
    /// Progress of the current attempt (0 to 100)
    pub percent: u8,
    /// Current status
    pub status: Status,
    /// Content title, once known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Estimated seconds remaining, if the engine reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
    /// Transfer speed as formatted by the engine (e.g., "1.20MiB/s")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
}

/// Event broadcast to subscribers of [`Coordinator::subscribe`](crate::Coordinator::subscribe)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A download was accepted and its worker spawned
    Started {
        /// Download ID
        id: DownloadId,
        /// Source URL
        url: String,
        /// Requested format
        format: DownloadFormat,
    },

    /// Progress or status update
    Progress {
        /// Download ID
        id: DownloadId,
        /// Progress percentage (0 to 100)
        percent: u8,
        /// Current status
        status: Status,
        /// Content title, once known
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },

    /// A transient failure is being retried from scratch
    AttemptRestarted {
        /// Download ID
        id: DownloadId,
        /// Attempt number about to start (2 for the first retry)
        attempt: u32,
        /// Maximum number of attempts
        max_attempts: u32,
    },

    /// The download reached a terminal status
    Finished {
        /// Download ID
        id: DownloadId,
        /// Terminal status
        status: Status,
        /// Final artifact, on success
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
        /// User-facing error message, on failure
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// History was cleared
    HistoryCleared,
}

/// Immutable history record of a finished download
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Download ID
    pub id: DownloadId,
    /// Content title, or the source URL when no title was reported
    pub title: String,
    /// Final artifact path (absent for cancelled or failed downloads)
    pub path: Option<PathBuf>,
    /// Terminal status
    pub status: Status,
    /// Requested format
    pub format: DownloadFormat,
    /// When the download finished
    pub completed_at: DateTime<Utc>,
}

impl From<&Download> for HistoryEntry {
    fn from(download: &Download) -> Self {
        Self {
            id: download.id(),
            title: download
                .title()
                .map(str::to_string)
                .unwrap_or_else(|| download.source().to_string()),
            path: download.output_path().map(|p| p.to_path_buf()),
            status: download.status(),
            format: download.format(),
            completed_at: download.completed_at().unwrap_or_else(Utc::now),
        }
    }
}
