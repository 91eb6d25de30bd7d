//! Progress relay
//!
//! One relay task exists per started download. It owns the retry loop, applies every
//! worker event to the download in the slot, forwards updates to the caller, and
//! performs the terminal bookkeeping: partial-file cleanup, slot release, history
//! append and the completion callback, in that order.

use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use super::slot::OperationSlot;
use super::worker::{self, WorkerEvent};
use crate::config::Config;
use crate::download::Download;
use crate::error::FetchError;
use crate::fetch::{Artifact, FetchCapability};
use crate::filesystem::Filesystem;
use crate::ledger::Ledger;
use crate::retry::download_with_retry;
use crate::types::{DownloadId, DownloadRequest, Event, HistoryEntry, ProgressUpdate, Status};
use crate::utils;

/// Caller-supplied progress callback
pub(crate) type ProgressCallback = Box<dyn FnMut(&ProgressUpdate) + Send + 'static>;

/// Caller-supplied completion callback
pub(crate) type CompletionCallback = Box<dyn FnOnce(Download) + Send + 'static>;

const FALLBACK_MESSAGE: &str = "The download could not be completed.";

pub(crate) struct Relay {
    pub(crate) id: DownloadId,
    pub(crate) request: DownloadRequest,
    pub(crate) config: Arc<Config>,
    pub(crate) engine: Arc<dyn FetchCapability>,
    pub(crate) filesystem: Arc<dyn Filesystem>,
    pub(crate) slot: Arc<OperationSlot>,
    pub(crate) ledger: Arc<tokio::sync::Mutex<Ledger>>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) cancel: CancellationToken,
    pub(crate) on_progress: Mutex<ProgressCallback>,
    /// Files written by the current attempt that must not outlive a failure
    pub(crate) touched: Mutex<BTreeSet<PathBuf>>,
}

impl Relay {
    pub(crate) async fn run(self, on_complete: CompletionCallback) {
        self.notify_current();

        let this = &self;
        let outcome =
            download_with_retry(&self.config.retry, &self.cancel, |attempt| this.run_attempt(attempt)).await;

        let Some(download) = self.finalize(outcome).await else {
            tracing::error!(download_id = %self.id, "Download vanished from the slot before finishing");
            return;
        };

        if catch_unwind(AssertUnwindSafe(|| on_complete(download))).is_err() {
            tracing::error!(download_id = %self.id, "Completion callback panicked");
        }
    }

    async fn run_attempt(&self, attempt: u32) -> Result<Artifact, FetchError> {
        if attempt > 1 {
            self.cleanup(None);
            if let Some(Err(e)) = self.slot.update(self.id, Download::restart_attempt) {
                tracing::debug!(download_id = %self.id, error = %e, "Could not reset download for retry");
            }
            self.emit(Event::AttemptRestarted {
                id: self.id,
                attempt,
                max_attempts: self.config.retry.max_attempts.max(1),
            });
            self.notify_current();
        }

        let (tx, mut rx) = mpsc::channel(self.config.download.event_channel_capacity.max(1));
        let handle = tokio::spawn(worker::run(
            self.id,
            Arc::clone(&self.engine),
            self.request.clone(),
            self.cancel.clone(),
            tx,
        ));

        let result = self.pump(&mut rx).await;
        drop(rx);

        if !handle.is_finished() {
            handle.abort();
        }
        if let Err(e) = handle.await
            && e.is_panic()
        {
            tracing::error!(download_id = %self.id, engine = self.engine.name(), "Worker panicked");
        }

        result
    }

    /// Apply worker events until the attempt reports its result
    async fn pump(&self, rx: &mut mpsc::Receiver<WorkerEvent>) -> Result<Artifact, FetchError> {
        let grace = self.config.download.cancel_grace;
        let abandon = async {
            self.cancel.cancelled().await;
            tokio::time::sleep(grace).await;
        };
        tokio::pin!(abandon);

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(WorkerEvent::Progress { percent, title, eta_seconds, speed, partial_path }) => {
                        if let Some(path) = partial_path {
                            self.touch(path);
                        }
                        let update = self.slot.update(self.id, |d| {
                            if let Some(title) = &title {
                                d.set_title(title);
                            }
                            d.apply_progress(percent);
                            let mut update = d.progress_update();
                            update.eta_seconds = eta_seconds;
                            update.speed = speed;
                            update
                        });
                        if let Some(update) = update {
                            self.deliver(&update);
                        }
                    }
                    Some(WorkerEvent::StatusChanged { status }) => {
                        match self.slot.update(self.id, |d| d.transition_to(status).map(|()| d.progress_update())) {
                            Some(Ok(update)) => self.deliver(&update),
                            Some(Err(e)) => tracing::debug!(download_id = %self.id, error = %e, "Ignoring status change"),
                            None => {}
                        }
                    }
                    Some(WorkerEvent::Completed { artifact }) => return Ok(artifact),
                    Some(WorkerEvent::Failed { error, leftover }) => {
                        if let Some(path) = leftover {
                            self.touch(path);
                        }
                        return Err(error);
                    }
                    None if self.cancel.is_cancelled() => return Err(FetchError::cancelled()),
                    None => return Err(FetchError::engine("worker stopped without reporting a result")),
                },
                () = &mut abandon => {
                    tracing::warn!(
                        download_id = %self.id,
                        grace_ms = grace.as_millis(),
                        "Worker did not stop after cancellation, abandoning it"
                    );
                    return Err(FetchError::cancelled());
                }
            }
        }
    }

    /// Record the terminal status and release the slot
    async fn finalize(&self, outcome: Result<Artifact, FetchError>) -> Option<Download> {
        let cancelled = self.cancel.is_cancelled() || matches!(&outcome, Err(e) if e.is_cancelled());

        let (artifact, failure) = match outcome {
            Ok(artifact) if cancelled => {
                // Output that finished after cancellation is not kept
                self.touch(artifact.path);
                (None, None)
            }
            Ok(artifact) => (Some(artifact), None),
            Err(_) if cancelled => (None, None),
            Err(e) => {
                tracing::warn!(download_id = %self.id, error = %e, code = e.code(), "Download failed");
                (None, Some(e))
            }
        };

        self.cleanup(artifact.as_ref().map(|a| a.path.as_path()));

        let finished = self.slot.finish(self.id, |d| {
            let result = match &artifact {
                Some(artifact) => {
                    if let Some(title) = &artifact.title {
                        d.set_title(title);
                    }
                    d.mark_completed(artifact.path.clone())
                }
                None if cancelled => d.mark_cancelled(),
                None => d.mark_error(failure.as_ref().map_or(FALLBACK_MESSAGE, |e| e.user_message())),
            };
            if let Err(e) = result {
                tracing::warn!(download_id = %self.id, error = %e, "Unexpected terminal transition");
                let _ = d.mark_error(FALLBACK_MESSAGE);
            }
        })?;

        {
            let mut ledger = self.ledger.lock().await;
            match ledger.append(HistoryEntry::from(&finished)).await {
                Ok(Some(evicted)) => {
                    tracing::debug!(evicted = %evicted.id, "Oldest history entry evicted");
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(download_id = %self.id, error = %e, "Failed to record download in history");
                }
            }
        }

        self.emit(Event::Finished {
            id: self.id,
            status: finished.status(),
            path: finished.output_path().map(Path::to_path_buf),
            error: finished.error_detail().map(str::to_string),
        });

        match finished.status() {
            Status::Completed => tracing::info!(
                download_id = %self.id,
                path = ?finished.output_path(),
                retries = finished.retries(),
                "Download completed"
            ),
            Status::Cancelled => tracing::info!(download_id = %self.id, "Download cancelled"),
            status => tracing::info!(
                download_id = %self.id,
                %status,
                error = finished.error_detail().unwrap_or_default(),
                "Download finished"
            ),
        }

        Some(finished)
    }

    fn notify_current(&self) {
        if let Some(update) = self.slot.update(self.id, |d| d.progress_update()) {
            self.deliver(&update);
        }
    }

    /// Forward an update to the caller and to subscribers
    fn deliver(&self, update: &ProgressUpdate) {
        {
            let mut callback = self.on_progress.lock().unwrap_or_else(PoisonError::into_inner);
            if catch_unwind(AssertUnwindSafe(|| (*callback)(update))).is_err() {
                tracing::error!(download_id = %self.id, "Progress callback panicked");
            }
        }

        self.emit(Event::Progress {
            id: update.id,
            percent: update.percent,
            status: update.status,
            title: update.title.clone(),
        });
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn touch(&self, path: PathBuf) {
        self.touched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path);
    }

    /// Remove temporary output of the current attempt, sparing `keep`
    ///
    /// Every path the engine reported is deleted except `keep`. Siblings are only
    /// removed when their name is the reported file's stem followed by an engine
    /// temp suffix, so on success the finished artifact and unrelated files in the
    /// destination are never candidates.
    fn cleanup(&self, keep: Option<&Path>) {
        let touched = std::mem::take(&mut *self.touched.lock().unwrap_or_else(PoisonError::into_inner));

        let mut stems = BTreeSet::new();
        for path in &touched {
            if let Some(stem) = partial_stem(path) {
                stems.insert(stem);
            }
            if Some(path.as_path()) == keep {
                continue;
            }
            match self.filesystem.delete_if_exists(path) {
                Ok(true) => tracing::debug!(download_id = %self.id, path = %path.display(), "Removed partial file"),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(download_id = %self.id, path = %path.display(), error = %e, "Failed to remove partial file")
                }
            }
        }

        for (dir, stem) in stems {
            let removed = self.filesystem.delete_partial_files(&dir, &stem);
            if removed > 0 {
                tracing::debug!(download_id = %self.id, dir = %dir.display(), stem = %stem, removed, "Removed engine temp files");
            }
        }
    }
}

/// Directory and output stem shared by an artifact and its temp files
///
/// `My clip.f137.mp4.part` and `My clip.mp4` both yield `My clip`.
fn partial_stem(path: &Path) -> Option<(PathBuf, String)> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty())?;
    let stem = utils::output_stem(path.file_name()?.to_str()?)?;
    Some((dir.to_path_buf(), stem.to_string()))
}
