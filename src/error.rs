//! Error types for ydl-core
//!
//! This module provides the error taxonomy for the library:
//! - [`ValidationError`] - rejections produced by the URL validator
//! - [`FetchError`] - typed failures reported by a fetch engine
//! - [`Error`] - the crate-wide error, covering preflight checks, single-flight
//!   enforcement, persistence and everything the above wrap
//!
//! Every error carries two texts: the `Display` output, which is diagnostic detail
//! meant for logs, and [`Error::user_message`], which is safe to show to end users.

use crate::types::{DownloadId, Status};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ydl-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ydl-core
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "retry.max_attempts")
        key: Option<String>,
    },

    /// The URL was rejected before any work started
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Another download is still active
    #[error("download {id} is still active")]
    AlreadyRunning {
        /// The download currently occupying the slot
        id: DownloadId,
    },

    /// The destination directory is not writable
    #[error("no write permission for {}", path.display())]
    PermissionDenied {
        /// The directory that failed the write probe
        path: PathBuf,
    },

    /// Insufficient disk space
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the operation
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Failed to check disk space
    #[error("failed to check disk space: {0}")]
    DiskSpaceCheckFailed(String),

    /// Failure reported by the fetch engine
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// A state machine transition that is not allowed
    #[error("illegal status transition from {from} to {to}")]
    InvalidTransition {
        /// Status before the attempted transition
        from: Status,
        /// Requested status
        to: Status,
    },

    /// External tool could not be located or executed
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Reasons a raw URL is rejected by the validator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Input was empty or whitespace only
    #[error("empty URL")]
    Empty,

    /// Input is not an absolute http(s) URL with a host
    #[error("invalid URL format {input:?}: {reason}")]
    InvalidFormat {
        /// The trimmed input that failed to parse
        input: String,
        /// Why the input was rejected
        reason: String,
    },

    /// No fetch engine handler matches the URL
    #[error("unsupported site for URL {url}")]
    UnsupportedSite {
        /// The rejected URL
        url: String,
    },
}

impl ValidationError {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::Empty => "empty_url",
            ValidationError::InvalidFormat { .. } => "invalid_url",
            ValidationError::UnsupportedSite { .. } => "unsupported_site",
        }
    }

    /// Message suitable for end users
    pub fn user_message(&self) -> &'static str {
        match self {
            ValidationError::Empty => "Please enter a URL.",
            ValidationError::InvalidFormat { .. } => {
                "The URL is not valid. Please check it and try again."
            }
            ValidationError::UnsupportedSite { .. } => "This site is not currently supported.",
        }
    }
}

/// Failure categories a fetch engine can report
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// Transient transport failure (timeouts, resets, DNS)
    Network,
    /// Content is private, removed or otherwise unavailable
    Unavailable,
    /// The engine found no handler for the URL
    Unsupported,
    /// The engine observed the cancellation flag
    Cancelled,
    /// The engine itself failed (missing post-processor, output not found, crash)
    Engine,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FetchErrorKind::Network => "network",
            FetchErrorKind::Unavailable => "unavailable",
            FetchErrorKind::Unsupported => "unsupported",
            FetchErrorKind::Cancelled => "cancelled",
            FetchErrorKind::Engine => "engine",
        };
        f.write_str(s)
    }
}

/// Typed failure returned by [`FetchCapability::fetch`](crate::fetch::FetchCapability::fetch)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    /// Failure category, drives retry classification
    pub kind: FetchErrorKind,
    /// Diagnostic detail (engine output, OS error text)
    pub message: String,
}

impl FetchError {
    /// Create a fetch error of the given kind
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Transient network failure
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Network, message)
    }

    /// Content unavailable
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Unavailable, message)
    }

    /// No handler for the URL
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Unsupported, message)
    }

    /// Engine-side failure
    pub fn engine(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Engine, message)
    }

    /// Cancellation observed
    pub fn cancelled() -> Self {
        Self::new(FetchErrorKind::Cancelled, "cancelled by user")
    }

    /// Returns true if this failure is the result of cancellation
    pub fn is_cancelled(&self) -> bool {
        self.kind == FetchErrorKind::Cancelled
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Network => "network_error",
            FetchErrorKind::Unavailable => "content_unavailable",
            FetchErrorKind::Unsupported => "unsupported_site",
            FetchErrorKind::Cancelled => "cancelled",
            FetchErrorKind::Engine => "download_failed",
        }
    }

    /// Message suitable for end users
    pub fn user_message(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Network => {
                "Connection error. Check your internet connection and try again."
            }
            FetchErrorKind::Unavailable => "The content is not available or has been removed.",
            FetchErrorKind::Unsupported => "This site is not currently supported.",
            FetchErrorKind::Cancelled => "Download cancelled.",
            FetchErrorKind::Engine => "The download could not be completed.",
        }
    }
}

/// Structured error information for presentation layers
///
/// `code` is stable and machine-readable, `message` is the user-facing text and
/// `details` optionally carries the diagnostic context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "already_running", "invalid_url")
    pub code: String,

    /// Human-readable error message, suitable for end users
    pub message: String,

    /// Optional diagnostic context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Error {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(e) => e.code(),
            Error::AlreadyRunning { .. } => "already_running",
            Error::PermissionDenied { .. } => "permission_denied",
            Error::InsufficientSpace { .. } => "insufficient_space",
            Error::DiskSpaceCheckFailed(_) => "disk_space_check_failed",
            Error::Fetch(e) => e.code(),
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::ExternalTool(_) => "external_tool_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
        }
    }

    /// Message suitable for end users, free of internal diagnostic detail
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::Validation(e) => e.user_message(),
            Error::Fetch(e) => e.user_message(),
            Error::AlreadyRunning { .. } => {
                "A download is already in progress. Cancel it to start another one."
            }
            Error::PermissionDenied { .. } => {
                "You do not have permission to save files in this folder. Please choose another folder."
            }
            Error::InsufficientSpace { .. } => {
                "There is not enough disk space. Free some space or choose another location."
            }
            Error::DiskSpaceCheckFailed(_) => "Could not check the free space of this folder.",
            Error::ExternalTool(_) => {
                "The download engine is not available. Please check your installation."
            }
            Error::Config { .. }
            | Error::InvalidTransition { .. }
            | Error::Io(_)
            | Error::Serialization(_) => "An unexpected error occurred.",
        }
    }

    /// Package code, user message and diagnostic detail together
    pub fn detail(&self) -> ErrorDetail {
        let details = match self {
            Error::AlreadyRunning { id } => Some(serde_json::json!({ "download_id": id })),
            Error::PermissionDenied { path } => Some(serde_json::json!({ "path": path })),
            Error::InsufficientSpace {
                required,
                available,
            } => Some(serde_json::json!({
                "required_bytes": required,
                "available_bytes": available,
            })),
            other => Some(serde_json::json!({ "diagnostic": other.to_string() })),
        };

        ErrorDetail {
            code: self.code().to_string(),
            message: self.user_message().to_string(),
            details,
        }
    }
}
