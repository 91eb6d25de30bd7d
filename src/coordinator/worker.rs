//! Worker task: runs one fetch attempt and reports through the relay channel

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::fetch::{Artifact, FetchCapability, ProgressSink};
use crate::types::{DownloadId, DownloadRequest, Status};

/// Messages from a worker to the relay, in production order
///
/// Every attempt ends with exactly one `Completed` or `Failed`.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    /// Progress tick or metadata
    Progress {
        percent: u8,
        title: Option<String>,
        eta_seconds: Option<u64>,
        speed: Option<String>,
        partial_path: Option<PathBuf>,
    },
    /// The engine moved to a new phase
    StatusChanged { status: Status },
    /// The attempt produced its artifact
    Completed { artifact: Artifact },
    /// The attempt failed; `leftover` names output that must not be kept
    Failed {
        error: FetchError,
        leftover: Option<PathBuf>,
    },
}

/// Run one attempt of `request` on `engine`
pub(crate) async fn run(
    id: DownloadId,
    engine: Arc<dyn FetchCapability>,
    request: DownloadRequest,
    cancel: CancellationToken,
    tx: mpsc::Sender<WorkerEvent>,
) {
    let mut sink = ProgressSink::new(tx.clone(), cancel.clone());

    // Checkpoint before opening the connection
    let result = if cancel.is_cancelled() {
        Err(FetchError::cancelled())
    } else {
        engine.fetch(&request, &mut sink, &cancel).await
    };
    drop(sink);

    let event = match result {
        Ok(artifact) if cancel.is_cancelled() => {
            tracing::debug!(download_id = %id, path = %artifact.path.display(), "Fetch finished after cancellation, discarding output");
            WorkerEvent::Failed {
                error: FetchError::cancelled(),
                leftover: Some(artifact.path),
            }
        }
        Ok(artifact) => WorkerEvent::Completed { artifact },
        Err(error) => {
            tracing::debug!(download_id = %id, engine = engine.name(), error = %error, "Fetch attempt failed");
            WorkerEvent::Failed {
                error,
                leftover: None,
            }
        }
    };

    if tx.send(event).await.is_err() {
        tracing::debug!(download_id = %id, "Relay stopped listening before the worker finished");
    }
}
