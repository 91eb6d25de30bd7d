//! Test configuration helpers for creating coordinators in a temp directory

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use ydl_core::config::{DownloadConfig, PersistenceConfig, RetryConfig};
use ydl_core::{Config, Coordinator, FetchCapability, LocalFilesystem};

/// Config rooted in `root`, with fast retries
pub fn test_config(root: &std::path::Path) -> Config {
    Config {
        download: DownloadConfig {
            download_dir: root.join("downloads"),
            cancel_grace: Duration::from_millis(500),
            ..Default::default()
        },
        retry: RetryConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            jitter: false,
            ..Default::default()
        },
        persistence: PersistenceConfig {
            history_path: root.join("history.json"),
            settings_path: root.join("config.json"),
        },
        ..Default::default()
    }
}

/// Create a coordinator around `engine`
///
/// Returns the coordinator and the tempdir (which must be kept alive).
pub async fn create_test_coordinator(engine: Arc<dyn FetchCapability>) -> (Coordinator, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = test_config(temp_dir.path());
    let coordinator = Coordinator::with_components(config, engine, Arc::new(LocalFilesystem::new()))
        .await
        .unwrap();
    (coordinator, temp_dir)
}
