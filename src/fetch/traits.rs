//! Traits and types for fetch engines

use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::sink::ProgressSink;
use crate::error::FetchError;
use crate::types::DownloadRequest;

/// Final output of a successful fetch
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Path of the finished file
    pub path: PathBuf,
    /// Title reported alongside the file, if the engine did not report it earlier
    pub title: Option<String>,
}

impl Artifact {
    /// Artifact at `path` with no title
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            title: None,
        }
    }

    /// Attach a title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// One progress tick reported by an engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchProgress {
    /// Percent of the current attempt (values above 100 are clamped)
    pub percent: u8,
    /// Estimated seconds remaining
    pub eta_seconds: Option<u64>,
    /// Transfer speed as formatted by the engine
    pub speed: Option<String>,
    /// File the engine is currently writing, so it can be removed on failure
    pub partial_path: Option<PathBuf>,
}

impl FetchProgress {
    /// Progress tick with only a percentage
    pub fn percent(percent: u8) -> Self {
        Self {
            percent,
            ..Self::default()
        }
    }
}

/// Trait for content fetching engines
///
/// An engine performs the actual network transfer. It reports metadata and progress
/// through the [`ProgressSink`] it is handed, and must observe `cancel` at its own
/// checkpoints: once the token is cancelled it should stop promptly and return
/// [`FetchError::cancelled`]. The sink's reporting methods already check the token
/// and return that error, so engines that propagate them with `?` get this for free.
///
/// # Examples
///
/// ```no_run
/// use ydl_core::fetch::{Artifact, FetchCapability, FetchProgress, ProgressSink};
/// use ydl_core::{DownloadRequest, FetchError};
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use url::Url;
///
/// struct Instant;
///
/// #[async_trait]
/// impl FetchCapability for Instant {
///     fn supports(&self, url: &Url) -> bool {
///         url.host_str() == Some("media.example")
///     }
///
///     async fn fetch(
///         &self,
///         request: &DownloadRequest,
///         sink: &mut ProgressSink,
///         _cancel: &CancellationToken,
///     ) -> Result<Artifact, FetchError> {
///         sink.metadata("Example clip").await?;
///         sink.progress(FetchProgress::percent(100)).await?;
///         Ok(Artifact::new(request.destination_dir.join("Example clip.mp4")))
///     }
///
///     fn name(&self) -> &'static str {
///         "instant"
///     }
/// }
/// ```
#[async_trait]
pub trait FetchCapability: Send + Sync {
    /// Whether a handler exists for this URL
    ///
    /// Must be a fast local check with no network I/O.
    fn supports(&self, url: &Url) -> bool;

    /// Fetch the content described by `request`
    async fn fetch(
        &self,
        request: &DownloadRequest,
        sink: &mut ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Artifact, FetchError>;

    /// Get the name of this engine
    fn name(&self) -> &'static str;
}
