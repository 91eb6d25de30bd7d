//! Scripted fetch engine built only on the public API

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use ydl_core::{Artifact, DownloadRequest, FetchCapability, FetchError, FetchProgress, ProgressSink};

/// Host the mock engine claims to support
pub const MOCK_HOST: &str = "videos.test";

/// Title reported by the mock engine
pub const MOCK_TITLE: &str = "Mock video";

/// How the mock engine behaves
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Fail the first `n` attempts with a network error, then succeed
    FlakyNetwork(u32),
    /// Fail every attempt as unavailable content
    Unavailable,
    /// Keep transferring until cancelled
    WaitForCancel,
}

/// Engine that writes a small file and reports progress as scripted
pub struct MockEngine {
    behavior: Behavior,
    attempts: AtomicU32,
}

impl MockEngine {
    /// Create an engine with the given behavior
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            attempts: AtomicU32::new(0),
        }
    }

    /// Number of fetch attempts so far
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

/// URL on the mock host
pub fn mock_url(video: &str) -> String {
    format!("https://{MOCK_HOST}/watch/{video}")
}

#[async_trait]
impl FetchCapability for MockEngine {
    fn supports(&self, url: &Url) -> bool {
        url.host_str() == Some(MOCK_HOST)
    }

    async fn fetch(
        &self,
        request: &DownloadRequest,
        sink: &mut ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Artifact, FetchError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        sink.metadata(MOCK_TITLE).await?;

        let extension = request.format.extension();
        let part = request
            .destination_dir
            .join(format!("{MOCK_TITLE}.{extension}.part"));
        tokio::fs::write(&part, b"partial")
            .await
            .map_err(|e| FetchError::engine(e.to_string()))?;

        sink.progress(FetchProgress {
            percent: 25,
            partial_path: Some(part.clone()),
            ..FetchProgress::default()
        })
        .await?;

        match self.behavior {
            Behavior::FlakyNetwork(failures) if attempt <= failures => {
                Err(FetchError::network("connection reset by peer"))
            }
            Behavior::Unavailable => Err(FetchError::unavailable("Video unavailable")),
            Behavior::WaitForCancel => {
                cancel.cancelled().await;
                Err(FetchError::cancelled())
            }
            Behavior::FlakyNetwork(_) => {
                for percent in [60, 100] {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    sink.progress(FetchProgress::percent(percent)).await?;
                }
                let target = request
                    .destination_dir
                    .join(format!("{MOCK_TITLE}.{extension}"));
                tokio::fs::rename(&part, &target)
                    .await
                    .map_err(|e| FetchError::engine(e.to_string()))?;
                Ok(Artifact::new(target))
            }
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
