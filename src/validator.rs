//! URL validation
//!
//! Validation happens in three phases, cheapest first:
//! 1. Empty input
//! 2. Structure (absolute `http`/`https` URL with a host)
//! 3. Engine support, via [`FetchCapability::supports`]
//!
//! Only the last phase touches the engine, and only as a local predicate.

use std::sync::Arc;
use url::Url;

use crate::error::ValidationError;
use crate::fetch::FetchCapability;

/// Schemes accepted by the validator
const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// A URL that passed validation
///
/// Only the validator hands these out, so holding one proves the URL is an
/// absolute http(s) URL that the engine claimed to support.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ValidatedUrl(Url);

impl ValidatedUrl {
    pub(crate) fn new_unchecked(url: Url) -> Self {
        Self(url)
    }

    /// Borrow the parsed URL
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// The URL as a string slice
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Unwrap into the parsed URL
    pub fn into_inner(self) -> Url {
        self.0
    }
}

impl std::fmt::Display for ValidatedUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Validates raw user input against URL structure and engine support
#[derive(Clone)]
pub struct UrlValidator {
    capability: Arc<dyn FetchCapability>,
}

impl UrlValidator {
    /// Create a validator backed by the given engine
    pub fn new(capability: Arc<dyn FetchCapability>) -> Self {
        Self { capability }
    }

    /// Validate a raw URL string
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use ydl_core::{UrlValidator, ValidationError};
    /// # fn example(validator: &UrlValidator) {
    /// assert_eq!(validator.validate("   "), Err(ValidationError::Empty));
    /// assert!(matches!(
    ///     validator.validate("not a url"),
    ///     Err(ValidationError::InvalidFormat { .. })
    /// ));
    /// # }
    /// ```
    pub fn validate(&self, raw: &str) -> Result<ValidatedUrl, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty);
        }

        let url = Url::parse(trimmed).map_err(|e| ValidationError::InvalidFormat {
            input: trimmed.to_string(),
            reason: e.to_string(),
        })?;

        if !ALLOWED_SCHEMES.contains(&url.scheme()) {
            return Err(ValidationError::InvalidFormat {
                input: trimmed.to_string(),
                reason: format!("scheme '{}' is not allowed", url.scheme()),
            });
        }

        if url.host_str().is_none_or(str::is_empty) {
            return Err(ValidationError::InvalidFormat {
                input: trimmed.to_string(),
                reason: "missing host".to_string(),
            });
        }

        if !self.capability.supports(&url) {
            tracing::debug!(url = %url, engine = self.capability.name(), "URL not supported by engine");
            return Err(ValidationError::UnsupportedSite {
                url: url.to_string(),
            });
        }

        Ok(ValidatedUrl(url))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::fetch::{Artifact, ProgressSink};
    use crate::types::DownloadRequest;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    /// Engine that answers `supports` from a flag and counts queries
    struct FlagEngine {
        supported: bool,
        queries: AtomicUsize,
    }

    impl FlagEngine {
        fn new(supported: bool) -> Arc<Self> {
            Arc::new(Self {
                supported,
                queries: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl FetchCapability for FlagEngine {
        fn supports(&self, _url: &Url) -> bool {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.supported
        }

        async fn fetch(
            &self,
            _request: &DownloadRequest,
            _sink: &mut ProgressSink,
            _cancel: &CancellationToken,
        ) -> Result<Artifact, FetchError> {
            unreachable!("validator must never fetch")
        }

        fn name(&self) -> &'static str {
            "flag"
        }
    }

    #[test]
    fn empty_and_whitespace_rejected() {
        let engine = FlagEngine::new(true);
        let validator = UrlValidator::new(engine.clone());

        assert_eq!(validator.validate(""), Err(ValidationError::Empty));
        assert_eq!(validator.validate(" \t\n"), Err(ValidationError::Empty));
        assert_eq!(engine.queries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn not_a_url_is_invalid_format_without_engine_query() {
        let engine = FlagEngine::new(true);
        let validator = UrlValidator::new(engine.clone());

        let err = validator.validate("not a url").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
        assert_eq!(
            engine.queries.load(Ordering::SeqCst),
            0,
            "structural failures must not reach the engine"
        );
    }

    #[test]
    fn non_http_scheme_rejected() {
        let validator = UrlValidator::new(FlagEngine::new(true));

        for raw in ["ftp://example.com/file", "file:///etc/passwd", "mailto:a@b.c"] {
            assert!(
                matches!(
                    validator.validate(raw),
                    Err(ValidationError::InvalidFormat { .. })
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn unsupported_site_reported_by_engine() {
        let engine = FlagEngine::new(false);
        let validator = UrlValidator::new(engine.clone());

        let err = validator.validate("https://example.com/video").unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnsupportedSite {
                url: "https://example.com/video".to_string()
            }
        );
        assert_eq!(engine.queries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn valid_url_is_trimmed() {
        let validator = UrlValidator::new(FlagEngine::new(true));

        let url = validator
            .validate("  https://www.youtube.com/watch?v=dQw4w9WgXcQ  ")
            .unwrap();
        assert_eq!(url.as_str(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(url.as_url().host_str(), Some("www.youtube.com"));
    }
}
