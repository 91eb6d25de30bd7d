//! The download entity and its state machine.
//!
//! ```text
//! Pending ──> Connecting ──> Downloading ──> Processing ──> Completed
//!                 ^               │  └──────────────────────────^
//!                 └─ retry ───────┘
//! any non-terminal ──> Cancelled | Error
//! ```
//!
//! Progress is clamped to `0..=100` and never decreases within an attempt. It is reset
//! to 0 only when a fresh attempt enters `Connecting`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{Error, Result};
use crate::types::{DownloadFormat, DownloadId, DownloadRequest, ProgressUpdate, Status};

/// One download operation
///
/// Fields are read through accessors; mutation is reserved to the coordinator so
/// that the transition rules and the progress invariant cannot be bypassed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Download {
    id: DownloadId,
    source: Url,
    destination_dir: PathBuf,
    format: DownloadFormat,
    title: Option<String>,
    status: Status,
    progress: u8,
    error_detail: Option<String>,
    output_path: Option<PathBuf>,
    retries: u32,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Download {
    /// Create a download in `Pending` for the given request
    pub fn new(request: &DownloadRequest) -> Self {
        Self {
            id: DownloadId::new(),
            source: request.url.as_url().clone(),
            destination_dir: request.destination_dir.clone(),
            format: request.format,
            title: None,
            status: Status::Pending,
            progress: 0,
            error_detail: None,
            output_path: None,
            retries: 0,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Unique identifier
    pub fn id(&self) -> DownloadId {
        self.id
    }

    /// Validated source URL
    pub fn source(&self) -> &Url {
        &self.source
    }

    /// Destination directory
    pub fn destination_dir(&self) -> &Path {
        &self.destination_dir
    }

    /// Requested format
    pub fn format(&self) -> DownloadFormat {
        self.format
    }

    /// Content title, once reported by the engine
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Current status
    pub fn status(&self) -> Status {
        self.status
    }

    /// Progress of the current attempt (0 to 100)
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// User-facing error message; set if and only if the status is `Error`
    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    /// Final artifact path, set on completion
    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    /// Number of transparent retries performed
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Creation time
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time of the terminal transition
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns true once a terminal status is reached
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns true while the download holds the single-flight slot
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Snapshot for the progress callback
    pub fn progress_update(&self) -> ProgressUpdate {
        ProgressUpdate {
            id: self.id,
            percent: self.progress,
            status: self.status,
            title: self.title.clone(),
            eta_seconds: None,
            speed: None,
        }
    }

    /// Move to `next` along an ordinary edge of the state machine
    ///
    /// Entering a terminal status stamps `completed_at`. Entering `Connecting`
    /// from `Pending` resets progress.
    pub(crate) fn transition_to(&mut self, next: Status) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        if next == Status::Connecting {
            self.progress = 0;
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Start a fresh attempt after a transient failure
    pub(crate) fn restart_attempt(&mut self) -> Result<()> {
        if !self.status.is_transferring() {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: Status::Connecting,
            });
        }

        self.status = Status::Connecting;
        self.progress = 0;
        self.retries += 1;
        Ok(())
    }

    /// Record engine progress; returns true if the stored value changed
    pub(crate) fn apply_progress(&mut self, percent: u8) -> bool {
        if !self.status.is_transferring() {
            return false;
        }
        let percent = percent.min(100);
        if percent > self.progress {
            self.progress = percent;
            true
        } else {
            false
        }
    }

    /// Record the title the first time the engine reports a non-empty one
    pub(crate) fn set_title(&mut self, title: &str) -> bool {
        let title = title.trim();
        if self.title.is_some() || title.is_empty() {
            return false;
        }
        self.title = Some(title.to_string());
        true
    }

    /// Finish successfully with the given artifact
    pub(crate) fn mark_completed(&mut self, path: PathBuf) -> Result<()> {
        // Engines may finish without an explicit stream-open signal.
        if self.status == Status::Connecting {
            self.transition_to(Status::Downloading)?;
        }
        self.transition_to(Status::Completed)?;
        self.progress = 100;
        self.output_path = Some(path);
        Ok(())
    }

    /// Finish as cancelled by the user
    pub(crate) fn mark_cancelled(&mut self) -> Result<()> {
        self.transition_to(Status::Cancelled)
    }

    /// Finish as failed with a user-facing message
    pub(crate) fn mark_error(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition_to(Status::Error)?;
        self.error_detail = Some(message.into());
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ValidatedUrl;

    fn request() -> DownloadRequest {
        DownloadRequest::new(
            ValidatedUrl::new_unchecked(Url::parse("https://media.example/watch?v=1").unwrap()),
            "/tmp/downloads",
            DownloadFormat::Audio,
        )
    }

    fn connecting() -> Download {
        let mut download = Download::new(&request());
        download.transition_to(Status::Connecting).unwrap();
        download
    }

    #[test]
    fn snapshot_serializes_source_url_as_string() {
        let download = connecting();

        let json = serde_json::to_value(&download).unwrap();
        assert_eq!(json["source"], "https://media.example/watch?v=1");

        let restored: Download = serde_json::from_value(json).unwrap();
        assert_eq!(restored, download);
    }

    #[test]
    fn new_download_is_pending() {
        let download = Download::new(&request());
        assert_eq!(download.status(), Status::Pending);
        assert_eq!(download.progress(), 0);
        assert!(download.completed_at().is_none());
        assert!(download.is_active());
    }

    #[test]
    fn progress_is_monotonic_and_clamped() {
        let mut download = connecting();
        download.transition_to(Status::Downloading).unwrap();

        assert!(download.apply_progress(40));
        assert!(!download.apply_progress(30), "progress must not go back");
        assert_eq!(download.progress(), 40);

        download.apply_progress(250);
        assert_eq!(download.progress(), 100);
    }

    #[test]
    fn progress_ignored_outside_transfer() {
        let mut download = Download::new(&request());
        assert!(!download.apply_progress(50));
        assert_eq!(download.progress(), 0);
    }

    #[test]
    fn restart_resets_progress_and_counts_retry() {
        let mut download = connecting();
        download.transition_to(Status::Downloading).unwrap();
        download.apply_progress(70);

        download.restart_attempt().unwrap();
        assert_eq!(download.status(), Status::Connecting);
        assert_eq!(download.progress(), 0);
        assert_eq!(download.retries(), 1);
    }

    #[test]
    fn restart_refused_after_terminal() {
        let mut download = connecting();
        download.mark_cancelled().unwrap();
        assert!(matches!(
            download.restart_attempt(),
            Err(Error::InvalidTransition { .. })
        ));
    }

    #[test]
    fn completed_at_stamped_once() {
        let mut download = connecting();
        download.mark_error("Connection error.").unwrap();
        let stamped = download.completed_at().unwrap();

        assert!(download.mark_cancelled().is_err());
        assert!(download.mark_completed(PathBuf::from("/tmp/x.mp3")).is_err());
        assert_eq!(download.completed_at(), Some(stamped));
        assert_eq!(download.status(), Status::Error);
        assert_eq!(download.error_detail(), Some("Connection error."));
    }

    #[test]
    fn completion_from_connecting_passes_through_downloading() {
        let mut download = connecting();
        download
            .mark_completed(PathBuf::from("/tmp/downloads/clip.mp3"))
            .unwrap();
        assert_eq!(download.status(), Status::Completed);
        assert_eq!(download.progress(), 100);
        assert_eq!(
            download.output_path(),
            Some(Path::new("/tmp/downloads/clip.mp3"))
        );
        assert!(download.error_detail().is_none());
    }

    #[test]
    fn title_is_set_once() {
        let mut download = connecting();
        assert!(!download.set_title("   "));
        assert!(download.set_title("First"));
        assert!(!download.set_title("Second"));
        assert_eq!(download.title(), Some("First"));
    }

    #[test]
    fn pending_can_be_torn_down() {
        let mut download = Download::new(&request());
        download.mark_cancelled().unwrap();
        assert_eq!(download.status(), Status::Cancelled);
        assert!(download.completed_at().is_some());
    }
}
