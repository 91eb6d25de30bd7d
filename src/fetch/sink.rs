//! Progress sink handed to engines during a fetch

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::traits::FetchProgress;
use crate::coordinator::WorkerEvent;
use crate::error::FetchError;
use crate::types::Status;

/// Reporting channel from an engine back to the coordinator
///
/// Every reporting method is also a cancellation checkpoint: once the download is
/// cancelled it returns [`FetchError::cancelled`], which the engine should propagate.
/// Events are delivered in order; when the coordinator falls behind, reporting waits
/// instead of dropping events.
pub struct ProgressSink {
    tx: mpsc::Sender<WorkerEvent>,
    cancel: CancellationToken,
    last_percent: u8,
    downloading: bool,
    processing: bool,
}

impl ProgressSink {
    pub(crate) fn new(tx: mpsc::Sender<WorkerEvent>, cancel: CancellationToken) -> Self {
        Self {
            tx,
            cancel,
            last_percent: 0,
            downloading: false,
            processing: false,
        }
    }

    /// Returns true once cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail with [`FetchError::cancelled`] if cancellation was requested
    pub fn checkpoint(&self) -> Result<(), FetchError> {
        if self.cancel.is_cancelled() {
            Err(FetchError::cancelled())
        } else {
            Ok(())
        }
    }

    /// Report the content title
    pub async fn metadata(&mut self, title: &str) -> Result<(), FetchError> {
        self.checkpoint()?;
        self.send(WorkerEvent::Progress {
            percent: self.last_percent,
            title: Some(title.to_string()),
            eta_seconds: None,
            speed: None,
            partial_path: None,
        })
        .await
    }

    /// Report a progress tick
    ///
    /// The first tick marks the stream as open.
    pub async fn progress(&mut self, progress: FetchProgress) -> Result<(), FetchError> {
        self.mark_downloading().await?;

        self.last_percent = progress.percent.min(100);
        self.send(WorkerEvent::Progress {
            percent: self.last_percent,
            title: None,
            eta_seconds: progress.eta_seconds,
            speed: progress.speed,
            partial_path: progress.partial_path,
        })
        .await?;

        self.checkpoint()
    }

    /// Report that a conversion step started; repeated calls are ignored
    pub async fn processing(&mut self) -> Result<(), FetchError> {
        self.checkpoint()?;
        if self.processing {
            return Ok(());
        }
        self.mark_downloading().await?;
        self.processing = true;
        self.send(WorkerEvent::StatusChanged {
            status: Status::Processing,
        })
        .await
    }

    async fn mark_downloading(&mut self) -> Result<(), FetchError> {
        if self.downloading {
            return Ok(());
        }
        self.downloading = true;
        self.send(WorkerEvent::StatusChanged {
            status: Status::Downloading,
        })
        .await
    }

    async fn send(&self, event: WorkerEvent) -> Result<(), FetchError> {
        // The receiver only goes away when the coordinator abandoned this attempt
        self.tx
            .send(event)
            .await
            .map_err(|_| FetchError::cancelled())
    }
}
