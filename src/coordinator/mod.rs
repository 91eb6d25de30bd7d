//! Download coordinator split into focused submodules.
//!
//! The [`Coordinator`] struct and its methods are organized by concern:
//! - [`control`] - Request preparation, start, cancel and state queries
//! - [`preflight`] - Writability and free-space checks run before spawning
//! - [`slot`] - The single-flight slot holding the current download
//! - [`worker`] - One fetch attempt running on the engine
//! - [`relay`] - Retry loop, event application, cleanup and history bookkeeping
//!
//! At most one download is active at a time. `start` returns as soon as the worker is
//! spawned; everything after that reaches the caller through its callbacks and the
//! [`Event`] broadcast.

mod control;
mod preflight;
mod relay;
mod slot;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub(crate) use worker::WorkerEvent;

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::fetch::{FetchCapability, YtDlpFetcher};
use crate::filesystem::{Filesystem, LocalFilesystem};
use crate::ledger::Ledger;
use crate::settings::{Settings, SettingsStore};
use crate::types::{DownloadFormat, Event, HistoryEntry};
use crate::validator::{UrlValidator, ValidatedUrl};
use slot::OperationSlot;

/// Main coordinator instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Coordinator {
    /// Configuration
    pub(crate) config: Arc<Config>,
    /// Engine performing the transfers
    pub(crate) engine: Arc<dyn FetchCapability>,
    /// Validator sharing the engine's support check
    pub(crate) validator: UrlValidator,
    /// Disk access for preflight and cleanup
    pub(crate) filesystem: Arc<dyn Filesystem>,
    /// Current (or last) download
    pub(crate) slot: Arc<OperationSlot>,
    /// Bounded history of finished downloads
    pub(crate) ledger: Arc<tokio::sync::Mutex<Ledger>>,
    /// Persisted user preferences
    pub(crate) settings: Arc<tokio::sync::Mutex<SettingsStore>>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Runtime the relay tasks are spawned on, so `start` can stay synchronous
    pub(crate) runtime: tokio::runtime::Handle,
    /// Relay of the most recent download, awaited on shutdown
    pub(crate) relay_task: Arc<std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl Coordinator {
    /// Create a coordinator backed by the yt-dlp engine
    ///
    /// This initializes all core components:
    /// - Validates the configuration
    /// - Locates the yt-dlp binary (configured path, or PATH search)
    /// - Loads history and settings (missing or corrupt files start empty)
    /// - Sets up the event broadcast channel
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) for invalid settings and
    /// [`Error::ExternalTool`](crate::Error::ExternalTool) when no yt-dlp binary is found.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let filesystem: Arc<dyn Filesystem> = Arc::new(LocalFilesystem::new());
        let engine = YtDlpFetcher::from_config(&config.tools)?.with_filesystem(Arc::clone(&filesystem));

        tracing::info!(
            engine = engine.name(),
            binary = %engine.binary_path().display(),
            "Fetch engine initialized"
        );

        Self::with_components(config, Arc::new(engine), filesystem).await
    }

    /// Create a coordinator with a custom engine and filesystem
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn with_components(
        config: Config,
        engine: Arc<dyn FetchCapability>,
        filesystem: Arc<dyn Filesystem>,
    ) -> Result<Self> {
        config.validate()?;

        let ledger = Ledger::load(&config.persistence.history_path).await;
        let settings = SettingsStore::load(&config.persistence.settings_path).await;

        // Broadcast buffer sized for a burst of progress events; slow subscribers see Lagged
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        Ok(Self {
            validator: UrlValidator::new(Arc::clone(&engine)),
            config: Arc::new(config),
            engine,
            filesystem,
            slot: Arc::new(OperationSlot::new()),
            ledger: Arc::new(tokio::sync::Mutex::new(ledger)),
            settings: Arc::new(tokio::sync::Mutex::new(settings)),
            event_tx,
            runtime: tokio::runtime::Handle::current(),
            relay_task: Arc::new(std::sync::Mutex::new(None)),
        })
    }

    /// Subscribe to coordinator events
    ///
    /// Each subscriber receives events independently; a subscriber that falls more
    /// than the buffer behind gets `RecvError::Lagged` and skips ahead.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// URL validator bound to this coordinator's engine
    pub fn validator(&self) -> &UrlValidator {
        &self.validator
    }

    /// Validate a raw URL
    pub fn validate(&self, raw: &str) -> Result<ValidatedUrl> {
        Ok(self.validator.validate(raw)?)
    }

    /// Finished downloads, newest first (at most five)
    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.ledger.lock().await.entries()
    }

    /// Remove all history entries
    pub async fn clear_history(&self) -> Result<()> {
        self.ledger.lock().await.clear().await?;
        tracing::info!("History cleared");
        let _ = self.event_tx.send(Event::HistoryCleared);
        Ok(())
    }

    /// Current user preferences
    pub async fn settings(&self) -> Settings {
        self.settings.lock().await.settings().clone()
    }

    /// Change the preferred format used when a request does not name one
    pub async fn set_default_format(&self, format: DownloadFormat) -> Result<()> {
        self.settings.lock().await.set_default_format(format).await
    }

    /// Record that the legal disclaimer was shown
    pub async fn mark_disclaimer_shown(&self) -> Result<()> {
        self.settings.lock().await.mark_disclaimer_shown().await
    }
}
