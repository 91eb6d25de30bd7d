//! Helpers for waiting on coordinator events

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use ydl_core::{DownloadId, Event, Status};

/// Result of waiting for a download to finish
#[derive(Debug, PartialEq)]
pub enum WaitResult {
    /// Download completed with the given artifact
    Completed(PathBuf),
    /// Download was cancelled
    Cancelled,
    /// Download failed with the given user-facing message
    Failed(String),
    /// Timeout waiting for completion
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait for the `Finished` event of download `id`
///
/// Subscribe before starting the download, so the event cannot be missed.
pub async fn wait_for_finished(
    events: &mut broadcast::Receiver<Event>,
    id: DownloadId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Finished {
                    id: event_id,
                    status,
                    path,
                    error,
                }) if event_id == id => {
                    return match status {
                        Status::Completed => WaitResult::Completed(path.unwrap_or_default()),
                        Status::Cancelled => WaitResult::Cancelled,
                        _ => WaitResult::Failed(error.unwrap_or_default()),
                    };
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Wait until download `id` reports at least `percent`
pub async fn wait_for_progress(
    events: &mut broadcast::Receiver<Event>,
    id: DownloadId,
    percent: u8,
    timeout: Duration,
) -> bool {
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Progress {
                    id: event_id,
                    percent: reported,
                    ..
                }) if event_id == id && reported >= percent => return true,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    })
    .await
    .unwrap_or(false)
}
