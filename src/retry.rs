//! Retry logic with exponential backoff
//!
//! Transient fetch failures are retried with the same request, from scratch, until
//! the attempt budget in [`RetryConfig`] is spent. Backoff is exponential with
//! optional jitter, and every wait is cut short by cancellation.
//!
//! # Example
//!
//! ```no_run
//! use ydl_core::retry::{IsRetryable, download_with_retry};
//! use ydl_core::config::RetryConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! let result = download_with_retry(&config, &cancel, |_attempt| async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{FetchError, FetchErrorKind};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, connection resets) should return `true`.
/// Permanent failures (content removed, unsupported site, cancellation) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self.kind {
            FetchErrorKind::Network => true,
            // Unavailable content, unknown sites and engine crashes do not heal on retry
            FetchErrorKind::Unavailable | FetchErrorKind::Unsupported | FetchErrorKind::Engine => {
                false
            }
            FetchErrorKind::Cancelled => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// `operation` receives the 1-based attempt number. At most `config.max_attempts`
/// attempts are made. Once `cancel` fires, no further attempt starts and a pending
/// backoff wait ends immediately; the last error is returned.
///
/// # Example
///
/// ```no_run
/// use ydl_core::retry::download_with_retry;
/// use ydl_core::config::RetryConfig;
/// use ydl_core::error::FetchError;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), FetchError> {
/// let config = RetryConfig::default();
/// let cancel = CancellationToken::new();
/// let result = download_with_retry(&config, &cancel, |attempt| async move {
///     // Simulate a network operation that might fail
///     Ok::<String, FetchError>(format!("succeeded on attempt {attempt}"))
/// }).await?;
/// # Ok(())
/// # }
/// ```
pub async fn download_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    let mut delay = config.initial_delay;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts && !cancel.is_cancelled() => {
                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                // Calculate jittered delay
                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tokio::select! {
                    _ = tokio::time::sleep(jittered_delay) => {}
                    _ = cancel.cancelled() => {
                        tracing::debug!(attempt = attempt, "Backoff interrupted by cancellation");
                        return Err(e);
                    }
                }

                // Calculate next delay with exponential backoff; overflow saturates at max_delay
                delay = Duration::try_from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
                    .map_or(config.max_delay, |next| next.min(config.max_delay));
                attempt += 1;
            }
            Err(e) => {
                if cancel.is_cancelled() {
                    tracing::debug!(error = %e, "Operation stopped by cancellation");
                } else if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay
///
/// Jitter is uniformly distributed between 0% and 100% of the delay,
/// so the actual delay lands between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::try_from_secs_f64(jittered_secs).unwrap_or(Duration::MAX)
}
