//! Shared test helpers for creating Coordinator instances in tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::download::Download;
use crate::error::{FetchError, FetchErrorKind, Result};
use crate::fetch::{Artifact, FetchCapability, FetchProgress, ProgressSink};
use crate::filesystem::{Filesystem, LocalFilesystem};
use crate::types::{DownloadFormat, DownloadRequest, ProgressUpdate};

pub(crate) const TEST_URL: &str = "https://media.example/watch?v=abc123";
pub(crate) const TEST_TITLE: &str = "Scripted clip";

/// What one fetch attempt of [`ScriptedFetcher`] does
#[derive(Clone, Copy, Debug)]
pub(crate) enum Step {
    /// Write a partial file, report some progress, then fail
    Fail(FetchErrorKind),
    /// Download to completion
    Succeed,
    /// Download, then run a conversion step
    SucceedWithProcessing,
    /// Report progress, then wait cooperatively for cancellation
    Hang,
    /// Report progress, then block without ever checking for cancellation
    Stubborn,
}

/// Engine replaying a fixed script of attempts
///
/// Each attempt writes `<title>.mp4.part` in the destination, reports it, and on
/// success renames it to `<title>.mp4`. Attempts past the end of the script succeed.
pub(crate) struct ScriptedFetcher {
    steps: Mutex<VecDeque<Step>>,
    attempts: AtomicUsize,
    /// Lets tests wait until the engine is mid-transfer
    pub(crate) reached_transfer: tokio::sync::Notify,
}

impl ScriptedFetcher {
    pub(crate) fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            attempts: AtomicUsize::new(0),
            reached_transfer: tokio::sync::Notify::new(),
        })
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn part_path(dir: &Path) -> PathBuf {
        dir.join(format!("{TEST_TITLE}.mp4.part"))
    }

    pub(crate) fn final_path(dir: &Path) -> PathBuf {
        dir.join(format!("{TEST_TITLE}.mp4"))
    }
}

#[async_trait]
impl FetchCapability for ScriptedFetcher {
    fn supports(&self, url: &Url) -> bool {
        url.host_str() == Some("media.example")
    }

    async fn fetch(
        &self,
        request: &DownloadRequest,
        sink: &mut ProgressSink,
        _cancel: &CancellationToken,
    ) -> std::result::Result<Artifact, FetchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Succeed);

        sink.metadata(TEST_TITLE).await?;

        let part = Self::part_path(&request.destination_dir);
        std::fs::write(&part, b"partial").map_err(|e| FetchError::engine(e.to_string()))?;
        sink.progress(FetchProgress {
            percent: 10,
            eta_seconds: Some(30),
            speed: Some("1.00MiB/s".to_string()),
            partial_path: Some(part.clone()),
        })
        .await?;
        self.reached_transfer.notify_one();

        match step {
            Step::Fail(kind) => {
                sink.progress(FetchProgress::percent(40)).await?;
                Err(FetchError::new(kind, "scripted failure"))
            }
            Step::Succeed | Step::SucceedWithProcessing => {
                sink.progress(FetchProgress::percent(50)).await?;
                sink.progress(FetchProgress::percent(100)).await?;
                if matches!(step, Step::SucceedWithProcessing) {
                    sink.processing().await?;
                }
                let target = Self::final_path(&request.destination_dir);
                std::fs::rename(&part, &target).map_err(|e| FetchError::engine(e.to_string()))?;
                Ok(Artifact::new(target))
            }
            Step::Hang => loop {
                sink.checkpoint()?;
                tokio::time::sleep(Duration::from_millis(10)).await;
            },
            Step::Stubborn => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Artifact::new(Self::final_path(&request.destination_dir)))
            }
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Filesystem that fakes writability and free space, delegating the rest to disk
pub(crate) struct StubFilesystem {
    writable: bool,
    available: Option<u64>,
}

impl StubFilesystem {
    pub(crate) fn new() -> Self {
        Self {
            writable: true,
            available: Some(u64::MAX),
        }
    }

    pub(crate) fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub(crate) fn with_available(mut self, bytes: u64) -> Self {
        self.available = Some(bytes);
        self
    }

    pub(crate) fn with_space_error(mut self) -> Self {
        self.available = None;
        self
    }
}

impl Filesystem for StubFilesystem {
    fn can_write(&self, _dir: &Path) -> bool {
        self.writable
    }

    fn available_bytes(&self, _dir: &Path) -> std::io::Result<u64> {
        self.available
            .ok_or_else(|| std::io::Error::other("statvfs failed"))
    }

    fn unique_name(&self, dir: &Path, base: &str, ext: &str) -> Result<PathBuf> {
        LocalFilesystem.unique_name(dir, base, ext)
    }

    fn delete_if_exists(&self, path: &Path) -> std::io::Result<bool> {
        LocalFilesystem.delete_if_exists(path)
    }

    fn delete_partial_files(&self, dir: &Path, stem: &str) -> usize {
        LocalFilesystem.delete_partial_files(dir, stem)
    }
}

/// Config with fast retries, a short cancel grace, and everything inside `root`
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = root.join("downloads");
    config.download.cancel_grace = Duration::from_millis(200);
    config.retry.initial_delay = Duration::from_millis(5);
    config.retry.max_delay = Duration::from_millis(20);
    config.retry.jitter = false;
    config.disk_space.min_free_space = 1;
    config.persistence.history_path = root.join("history.json");
    config.persistence.settings_path = root.join("config.json");
    std::fs::create_dir_all(&config.download.download_dir).unwrap();
    config
}

/// Helper to create a test Coordinator with the given engine and filesystem.
/// Returns the coordinator and the tempdir (which must be kept alive).
pub(crate) async fn create_test_coordinator_with(
    engine: Arc<ScriptedFetcher>,
    filesystem: Arc<dyn Filesystem>,
) -> (Coordinator, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = test_config(temp_dir.path());
    let coordinator = Coordinator::with_components(config, engine, filesystem)
        .await
        .unwrap();
    (coordinator, temp_dir)
}

/// Helper to create a test Coordinator backed by the local disk.
pub(crate) async fn create_test_coordinator(
    engine: Arc<ScriptedFetcher>,
) -> (Coordinator, tempfile::TempDir) {
    create_test_coordinator_with(engine, Arc::new(LocalFilesystem::new())).await
}

/// Request for [`TEST_URL`] into the coordinator's download directory
pub(crate) async fn test_request(coordinator: &Coordinator) -> DownloadRequest {
    coordinator
        .prepare(TEST_URL, None, Some(DownloadFormat::Video))
        .await
        .unwrap()
}

/// Callbacks that forward into channels the test can inspect
pub(crate) struct Observed {
    pub(crate) progress: mpsc::UnboundedReceiver<ProgressUpdate>,
    pub(crate) completed: oneshot::Receiver<Download>,
}

impl Observed {
    /// Wait for the completion callback
    pub(crate) async fn finished(&mut self) -> Download {
        tokio::time::timeout(Duration::from_secs(10), &mut self.completed)
            .await
            .expect("download did not finish in time")
            .expect("completion callback dropped without being called")
    }

    /// Every progress update delivered so far
    pub(crate) fn updates(&mut self) -> Vec<ProgressUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = self.progress.try_recv() {
            updates.push(update);
        }
        updates
    }
}

/// Start `request` with channel-backed callbacks
pub(crate) fn start_observed(
    coordinator: &Coordinator,
    request: DownloadRequest,
) -> Result<(Download, Observed)> {
    let (progress_tx, progress) = mpsc::unbounded_channel();
    let (completed_tx, completed) = oneshot::channel();

    let download = coordinator.start(
        request,
        move |update| {
            let _ = progress_tx.send(update.clone());
        },
        move |download| {
            let _ = completed_tx.send(download);
        },
    )?;

    Ok((download, Observed { progress, completed }))
}
