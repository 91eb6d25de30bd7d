//! # ydl-core
//!
//! Backend library for a single-download media fetcher.
//!
//! ## Design Philosophy
//!
//! ydl-core is designed to be:
//! - **Single-flight** - At most one download runs at a time; a second start is rejected
//! - **Non-blocking** - `start` returns as soon as the worker is spawned
//! - **Library-first** - No UI, purely a Rust crate for embedding in a front end
//! - **Engine-agnostic** - Transfers go through the [`FetchCapability`] trait; a
//!   yt-dlp backend is included
//!
//! ## Quick Start
//!
//! ```no_run
//! use ydl_core::{Config, Coordinator, DownloadFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = Coordinator::new(Config::default()).await?;
//!
//!     let request = coordinator
//!         .prepare("https://www.youtube.com/watch?v=dQw4w9WgXcQ", None, Some(DownloadFormat::Audio))
//!         .await?;
//!
//!     let (done_tx, done_rx) = tokio::sync::oneshot::channel();
//!     coordinator.start(
//!         request,
//!         |update| println!("{:>3}% {}", update.percent, update.status),
//!         move |download| {
//!             let _ = done_tx.send(download);
//!         },
//!     )?;
//!
//!     let download = done_rx.await?;
//!     println!("{} -> {:?}", download.status(), download.output_path());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Download coordinator (decomposed into focused submodules)
pub mod coordinator;
/// Download entity and state machine
pub mod download;
/// Error types
pub mod error;
/// Fetch engines
pub mod fetch;
/// Filesystem access for preflight and cleanup
pub mod filesystem;
/// Bounded download history
pub mod ledger;
/// Retry logic with exponential backoff
pub mod retry;
/// Persisted user preferences
pub mod settings;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;
/// URL validation
pub mod validator;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::Coordinator;
pub use download::Download;
pub use error::{Error, ErrorDetail, FetchError, FetchErrorKind, Result, ValidationError};
pub use fetch::{Artifact, FetchCapability, FetchProgress, ProgressSink, YtDlpFetcher};
pub use filesystem::{Filesystem, LocalFilesystem};
pub use ledger::{HISTORY_CAPACITY, Ledger};
pub use settings::{Settings, SettingsStore};
pub use types::{
    DownloadFormat, DownloadId, DownloadRequest, Event, HistoryEntry, ProgressUpdate, Status,
};
pub use validator::{UrlValidator, ValidatedUrl};

/// Helper function to run the coordinator with graceful signal handling.
///
/// Waits for a termination signal and then calls the coordinator's `shutdown()` method,
/// which cancels the active download and waits for its cleanup.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use ydl_core::{Config, Coordinator, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let coordinator = Coordinator::new(Config::default()).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(coordinator).await;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(coordinator: Coordinator) {
    wait_for_signal().await;
    coordinator.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register Unix signal handlers, using ctrl_c fallback");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
