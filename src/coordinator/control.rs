//! Download control: prepare, start, cancel and state queries.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::Coordinator;
use super::preflight;
use super::relay::Relay;
use crate::download::Download;
use crate::error::{Error, Result};
use crate::types::{DownloadFormat, DownloadId, DownloadRequest, Event, ProgressUpdate, Status};

/// Extra time allowed after the cancel grace for cleanup and history
const SHUTDOWN_MARGIN: Duration = Duration::from_secs(5);

impl Coordinator {
    /// Build a request from raw user input
    ///
    /// The URL is validated first. A missing destination falls back to the last used
    /// folder (if it still exists) and then to the configured download directory; a
    /// missing format falls back to the preferred format. The chosen folder is
    /// remembered for next time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the URL is empty, malformed, or not
    /// supported by the engine.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use ydl_core::*;
    /// # async fn example(coordinator: Coordinator) -> Result<()> {
    /// let request = coordinator
    ///     .prepare("https://www.youtube.com/watch?v=dQw4w9WgXcQ", None, Some(DownloadFormat::Audio))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn prepare(
        &self,
        raw_url: &str,
        destination: Option<PathBuf>,
        format: Option<DownloadFormat>,
    ) -> Result<DownloadRequest> {
        let url = self.validator.validate(raw_url)?;

        let mut settings = self.settings.lock().await;
        let destination_dir = destination
            .or_else(|| settings.last_output_folder().map(Path::to_path_buf))
            .unwrap_or_else(|| self.config.download.download_dir.clone());
        let format = format.unwrap_or_else(|| settings.default_format());

        if let Err(e) = settings.set_last_output_folder(&destination_dir).await {
            tracing::warn!(error = %e, "Failed to remember output folder");
        }

        Ok(DownloadRequest::new(url, destination_dir, format))
    }

    /// Start a download
    ///
    /// Runs the preflight checks, claims the single-flight slot, and spawns the
    /// worker. Preflight does a little blocking disk I/O on the calling thread: it
    /// creates the destination directory if missing and probes it with a scratch file. Returns as soon as the worker is spawned with a snapshot of the new
    /// download in `Connecting`; the transfer itself never blocks the caller.
    ///
    /// `on_progress` receives every update in the order the worker produced it.
    /// `on_complete` is called exactly once, after the terminal status is recorded in
    /// history. Both run on a runtime thread and should return quickly.
    ///
    /// # Errors
    ///
    /// Nothing is spawned and no callback is invoked when this returns an error:
    /// - [`Error::AlreadyRunning`] if another download holds the slot
    /// - [`Error::PermissionDenied`] if the destination is not writable
    /// - [`Error::InsufficientSpace`] if the destination volume is below the configured minimum
    /// - [`Error::DiskSpaceCheckFailed`] if free space could not be determined
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use ydl_core::*;
    /// # async fn example(coordinator: Coordinator, request: DownloadRequest) -> Result<()> {
    /// let download = coordinator.start(
    ///     request,
    ///     |update| println!("{}% ({})", update.percent, update.status),
    ///     |download| println!("finished: {}", download.status()),
    /// )?;
    /// println!("started {}", download.id());
    /// # Ok(())
    /// # }
    /// ```
    pub fn start<P, C>(&self, request: DownloadRequest, on_progress: P, on_complete: C) -> Result<Download>
    where
        P: FnMut(&ProgressUpdate) + Send + 'static,
        C: FnOnce(Download) + Send + 'static,
    {
        // Reject early so a busy coordinator never touches the disk
        if let Some(id) = self.slot.active_id() {
            return Err(Error::AlreadyRunning { id });
        }

        preflight::check_destination(
            self.filesystem.as_ref(),
            &self.config.disk_space,
            &request.destination_dir,
        )?;

        let mut download = Download::new(&request);
        download.transition_to(Status::Connecting)?;
        let id = download.id();

        let cancel = CancellationToken::new();
        // Claim is the authoritative check: the peek above can race with another start
        self.slot.claim(download.clone(), cancel.clone())?;

        let _ = self.event_tx.send(Event::Started {
            id,
            url: request.url.to_string(),
            format: request.format,
        });
        tracing::info!(
            download_id = %id,
            url = %request.url,
            format = request.format.as_str(),
            destination = %request.destination_dir.display(),
            "Download started"
        );

        let relay = Relay {
            id,
            request,
            config: Arc::clone(&self.config),
            engine: Arc::clone(&self.engine),
            filesystem: Arc::clone(&self.filesystem),
            slot: Arc::clone(&self.slot),
            ledger: Arc::clone(&self.ledger),
            event_tx: self.event_tx.clone(),
            cancel,
            on_progress: Mutex::new(Box::new(on_progress)),
            touched: Mutex::new(BTreeSet::new()),
        };
        let handle = self.runtime.spawn(relay.run(Box::new(on_complete)));
        *self
            .relay_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);

        Ok(download)
    }

    /// Request cancellation of the active download
    ///
    /// Returns true if `id` is the active download; the request is then delivered
    /// and the download finishes as `Cancelled` unless it already produced its
    /// artifact. Repeated calls return true without further effect. Returns false,
    /// with no side effects, for any other ID or when nothing is running.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use ydl_core::*;
    /// # fn example(coordinator: Coordinator, id: DownloadId) {
    /// if !coordinator.cancel(id) {
    ///     println!("{id} is not running");
    /// }
    /// # }
    /// ```
    pub fn cancel(&self, id: DownloadId) -> bool {
        self.slot.cancel(id)
    }

    /// Snapshot of the active download, or of the last finished one
    ///
    /// Returns `None` only before the first download was started.
    pub fn current_download(&self) -> Option<Download> {
        self.slot.snapshot()
    }

    /// Whether a download currently holds the slot
    pub fn is_busy(&self) -> bool {
        self.slot.active_id().is_some()
    }

    /// Cancel the active download and wait for its relay to finish
    ///
    /// Waits at most the configured cancel grace plus a few seconds, so history and
    /// the completion callback are settled before the process exits. Returns
    /// immediately when nothing is running.
    pub async fn shutdown(&self) {
        if let Some(id) = self.slot.active_id() {
            tracing::info!(download_id = %id, "Shutting down, cancelling active download");
            self.slot.cancel(id);
        }

        let relay = self
            .relay_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(relay) = relay else {
            return;
        };

        let limit = self.config.download.cancel_grace + SHUTDOWN_MARGIN;
        match tokio::time::timeout(limit, relay).await {
            Ok(Ok(())) => tracing::info!("Coordinator shut down"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Relay task failed during shutdown"),
            Err(_) => tracing::warn!("Active download did not finish before shutdown"),
        }
    }
}
