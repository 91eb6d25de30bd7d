//! Live download through the real yt-dlp binary
//!
//! Requires network access and `yt-dlp` (plus `ffmpeg` for audio) on the PATH:
//!
//! ```bash
//! cargo test --test ytdlp_live -- --ignored --nocapture
//! ```

mod common;

use common::{WaitResult, test_config, wait_for_finished};
use std::time::Duration;
use ydl_core::{Coordinator, DownloadFormat};

/// Short, stable, freely licensed test clip
const LIVE_URL: &str = "https://www.youtube.com/watch?v=jNQXAC9IVRw";

#[tokio::test]
#[ignore] // Requires yt-dlp binary and network access
async fn live_audio_download() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("ydl_core=debug"))
        .with_test_writer()
        .try_init();

    let temp_dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new(test_config(temp_dir.path())).await.unwrap();
    let mut events = coordinator.subscribe();

    let request = coordinator
        .prepare(LIVE_URL, None, Some(DownloadFormat::Audio))
        .await
        .unwrap();
    let download = coordinator
        .start(
            request,
            |update| println!("{:>3}% {} {:?}", update.percent, update.status, update.speed),
            |_| {},
        )
        .unwrap();

    match wait_for_finished(&mut events, download.id(), Duration::from_secs(300)).await {
        WaitResult::Completed(path) => {
            assert!(path.exists());
            assert_eq!(path.extension().unwrap(), "mp3");
        }
        other => panic!("live download did not complete: {other:?}"),
    }
}
