//! User preferences persisted between sessions

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::DownloadFormat;
use crate::utils::write_json_atomic;

/// Settings format version
const SETTINGS_VERSION: u32 = 1;

/// Persisted user preferences
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Format version
    #[serde(default = "default_version")]
    pub version: u32,
    /// Folder chosen for the last download
    #[serde(default)]
    pub last_output_folder: Option<PathBuf>,
    /// Preferred format
    #[serde(default)]
    pub default_format: DownloadFormat,
    /// Whether the legal disclaimer still has to be shown
    #[serde(default = "default_show_disclaimer")]
    pub show_disclaimer: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            last_output_folder: None,
            default_format: DownloadFormat::default(),
            show_disclaimer: true,
        }
    }
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

fn default_show_disclaimer() -> bool {
    true
}

/// JSON-backed settings store
///
/// Loading never fails: a missing or corrupt file yields defaults. Every setter
/// writes the file atomically.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    /// Load settings from `path`
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt settings file, using defaults");
                Settings::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read settings, using defaults");
                Settings::default()
            }
        };
        Self { path, settings }
    }

    /// Current settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Settings file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last used output folder, if it still exists as a directory
    pub fn last_output_folder(&self) -> Option<&Path> {
        self.settings
            .last_output_folder
            .as_deref()
            .filter(|folder| folder.is_dir())
    }

    /// Preferred format
    pub fn default_format(&self) -> DownloadFormat {
        self.settings.default_format
    }

    /// Whether the disclaimer still has to be shown
    pub fn should_show_disclaimer(&self) -> bool {
        self.settings.show_disclaimer
    }

    /// Remember the folder chosen for a download
    pub async fn set_last_output_folder(&mut self, folder: impl Into<PathBuf>) -> Result<()> {
        let folder = folder.into();
        if self.settings.last_output_folder.as_ref() == Some(&folder) {
            return Ok(());
        }
        self.update(|s| s.last_output_folder = Some(folder)).await
    }

    /// Change the preferred format
    pub async fn set_default_format(&mut self, format: DownloadFormat) -> Result<()> {
        self.update(|s| s.default_format = format).await
    }

    /// Record that the disclaimer was shown; it will not be shown again
    pub async fn mark_disclaimer_shown(&mut self) -> Result<()> {
        self.update(|s| s.show_disclaimer = false).await
    }

    async fn update(&mut self, change: impl FnOnce(&mut Settings)) -> Result<()> {
        let mut next = self.settings.clone();
        change(&mut next);
        next.version = SETTINGS_VERSION;
        write_json_atomic(&self.path, &next).await?;
        self.settings = next;
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn defaults_when_missing() {
        let temp_dir = TempDir::new().unwrap();
        let store = SettingsStore::load(temp_dir.path().join("config.json")).await;

        assert_eq!(store.settings(), &Settings::default());
        assert!(store.should_show_disclaimer());
        assert_eq!(store.default_format(), DownloadFormat::Video);
        assert!(store.last_output_folder().is_none());
    }

    #[tokio::test]
    async fn defaults_when_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let store = SettingsStore::load(&path).await;
        assert_eq!(store.settings(), &Settings::default());
    }

    #[tokio::test]
    async fn partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "default_format": "audio" }"#).unwrap();

        let store = SettingsStore::load(&path).await;
        assert_eq!(store.default_format(), DownloadFormat::Audio);
        assert!(store.should_show_disclaimer());
    }

    #[tokio::test]
    async fn setters_persist() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        let downloads = temp_dir.path().join("downloads");
        std::fs::create_dir(&downloads).unwrap();

        let mut store = SettingsStore::load(&path).await;
        store.set_last_output_folder(&downloads).await.unwrap();
        store.set_default_format(DownloadFormat::Audio).await.unwrap();
        store.mark_disclaimer_shown().await.unwrap();

        let reloaded = SettingsStore::load(&path).await;
        assert_eq!(reloaded.last_output_folder(), Some(downloads.as_path()));
        assert_eq!(reloaded.default_format(), DownloadFormat::Audio);
        assert!(!reloaded.should_show_disclaimer());

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["default_format"], "audio");
        assert_eq!(json["show_disclaimer"], false);
    }

    #[tokio::test]
    async fn vanished_folder_is_not_offered() {
        let temp_dir = TempDir::new().unwrap();
        let gone = temp_dir.path().join("gone");
        std::fs::create_dir(&gone).unwrap();

        let mut store = SettingsStore::load(temp_dir.path().join("config.json")).await;
        store.set_last_output_folder(&gone).await.unwrap();
        std::fs::remove_dir(&gone).unwrap();

        assert!(store.last_output_folder().is_none());
        assert_eq!(store.settings().last_output_folder.as_deref(), Some(gone.as_path()));
    }
}
