//! Configuration types for ydl-core

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Main configuration for the [`Coordinator`](crate::Coordinator)
///
/// Fields are organized into sub-configs:
/// - [`download`](DownloadConfig): default directory, relay channel, cancellation grace
/// - [`retry`](RetryConfig): transient failure policy
/// - [`disk_space`](DiskSpaceConfig): free-space preflight
/// - [`tools`](ToolsConfig): yt-dlp binary and format options
/// - [`persistence`](PersistenceConfig): history and settings files
///
/// Every field has a default, so `Config::default()` is a working configuration
/// as long as `yt-dlp` is on the PATH.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Retry policy for transient network failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Free-space preflight check
    #[serde(default)]
    pub disk_space: DiskSpaceConfig,

    /// External engine options
    #[serde(default)]
    pub tools: ToolsConfig,

    /// On-disk state
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Check values that would make the coordinator misbehave
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Config {
                message: "at least one attempt is required".to_string(),
                key: Some("retry.max_attempts".to_string()),
            });
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::Config {
                message: format!(
                    "backoff multiplier must be a finite number >= 1.0, got {}",
                    self.retry.backoff_multiplier
                ),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        if self.download.event_channel_capacity == 0 {
            return Err(Error::Config {
                message: "event channel capacity must be positive".to_string(),
                key: Some("download.event_channel_capacity".to_string()),
            });
        }
        Ok(())
    }
}

/// Download behavior configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Fallback destination when neither the caller nor the settings provide one
    /// (default: the platform downloads folder, or "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Capacity of the worker-to-coordinator event channel (default: 64)
    ///
    /// The worker waits when the channel is full, so events are never dropped.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// How long a worker may take to unwind after cancellation before its fetch
    /// is abandoned (default: 1 second)
    #[serde(default = "default_cancel_grace", with = "duration_serde")]
    pub cancel_grace: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            event_channel_capacity: default_event_channel_capacity(),
            cancel_grace: default_cancel_grace(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before the first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Disk space checking configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskSpaceConfig {
    /// Enable disk space checking (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum free space required to start a download (default: 256 MiB)
    #[serde(default = "default_min_free_space")]
    pub min_free_space: u64,
}

impl Default for DiskSpaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_free_space: default_min_free_space(),
        }
    }
}

/// External engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Whether to search PATH for yt-dlp if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Hosts the engine is allowed to handle; empty accepts any host (default: empty)
    ///
    /// Entries match the host exactly or as a parent domain, so "youtube.com"
    /// also accepts "www.youtube.com".
    #[serde(default)]
    pub supported_hosts: Vec<String>,

    /// MP3 quality passed to the audio extractor (default: "192K")
    #[serde(default = "default_audio_quality")]
    pub audio_quality: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            search_path: true,
            supported_hosts: Vec::new(),
            audio_quality: default_audio_quality(),
        }
    }
}

/// Persistence configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// History snapshot file (default: "<config dir>/ydownloader/history.json")
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,

    /// Settings file (default: "<config dir>/ydownloader/config.json")
    #[serde(default = "default_settings_path")]
    pub settings_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            history_path: default_history_path(),
            settings_path: default_settings_path(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    crate::utils::default_downloads_dir()
}

fn default_event_channel_capacity() -> usize {
    64
}

fn default_cancel_grace() -> Duration {
    Duration::from_secs(1)
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_min_free_space() -> u64 {
    256 * 1024 * 1024 // 256 MiB
}

fn default_audio_quality() -> String {
    "192K".to_string()
}

fn default_history_path() -> PathBuf {
    crate::utils::app_data_dir().join("history.json")
}

fn default_settings_path() -> PathBuf {
    crate::utils::app_data_dir().join("config.json")
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.disk_space.enabled);
        assert!(config.tools.supported_hosts.is_empty());
    }

    #[test]
    fn empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.retry.initial_delay, Duration::from_secs(1));
        assert_eq!(config.download.event_channel_capacity, 64);
        assert_eq!(config.tools.audio_quality, "192K");
    }

    #[test]
    fn partial_json_overrides_only_given_keys() {
        let config: Config = serde_json::from_str(
            r#"{ "retry": { "max_attempts": 5, "initial_delay": 3 }, "disk_space": { "enabled": false } }"#,
        )
        .unwrap();

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay, Duration::from_secs(3));
        assert_eq!(config.retry.max_delay, Duration::from_secs(10));
        assert!(!config.disk_space.enabled);
        assert_eq!(config.disk_space.min_free_space, 256 * 1024 * 1024);
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;

        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("retry.max_attempts"))
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_backoff_multiplier_rejected() {
        for multiplier in [f64::INFINITY, f64::NAN, 0.5] {
            let mut config = Config::default();
            config.retry.backoff_multiplier = multiplier;

            match config.validate() {
                Err(Error::Config { key, .. }) => {
                    assert_eq!(key.as_deref(), Some("retry.backoff_multiplier"))
                }
                other => panic!("expected config error for {multiplier}, got {other:?}"),
            }
        }
    }

    #[test]
    fn zero_channel_capacity_rejected() {
        let mut config = Config::default();
        config.download.event_channel_capacity = 0;
        assert!(config.validate().is_err());
    }
}
