//! Retry logic with exponential backoff
//!
//! Used for release feed requests and asset downloads. Engine runs are never retried
//! automatically; a failed job waits for an explicit `retry`.
//!
//! # Example
//!
//! ```no_run
//! use media_dl::retry::download_with_retry;
//! use media_dl::config::RetryConfig;
//! use media_dl::error::Error;
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::default();
//! let body = download_with_retry(&config, || async {
//!     Ok::<String, Error>("release".to_string())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, UpdateError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Classifies an error as transient (worth another attempt) or permanent
pub trait IsRetryable {
    /// Returns true if the operation should be attempted again
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|status| status.is_server_error())
            }
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // A truncated asset transfer is worth another attempt; a bad checksum is not
            Error::Update(UpdateError::DownloadFailed { reason, .. }) => {
                reason.contains("timed out")
                    || reason.contains("connection")
                    || reason.contains("incomplete")
            }
            Error::Update(_) => false,
            Error::ExternalTool(msg) => msg.contains("timed out"),
            Error::Download(_)
            | Error::Resolve(_)
            | Error::Config { .. }
            | Error::NotFound(_)
            | Error::ShuttingDown
            | Error::Serialization(_)
            | Error::ApiServerError(_)
            | Error::Other(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Returns the first success, the first non-retryable error, or the last error once
/// `config.max_attempts` retries have been spent.
pub async fn download_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;
                let wait = if config.jitter { add_jitter(delay) } else { delay };

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = wait.as_millis(),
                    "operation failed, retrying"
                );

                tokio::time::sleep(wait).await;
                delay = next_delay(delay, config);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(error = %e, attempts = attempt + 1, "retry attempts exhausted");
                } else {
                    tracing::debug!(error = %e, "non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

fn next_delay(current: Duration, config: &RetryConfig) -> Duration {
    Duration::from_secs_f64(current.as_secs_f64() * config.backoff_multiplier).min(config.max_delay)
}

/// Stretch a delay by a random factor in [1.0, 2.0]
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}
