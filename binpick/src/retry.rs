use crate::error::{InstallError, Result};
use backoff::future::retry;
use backoff::ExponentialBackoff;
use std::time::Duration;
use tracing::{info, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_elapsed_time: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            max_elapsed_time: Some(Duration::from_secs(120)),
        }
    }
}

impl RetryConfig {
    /// A single attempt, for `--no-retry`.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Create an exponential backoff from this configuration
    pub fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            max_elapsed_time: self.max_elapsed_time,
            ..Default::default()
        }
    }
}

/// Execute an async operation, retrying transient failures.
///
/// Failures that [`is_retryable`] rejects are returned at once.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let backoff = config.to_backoff();
    let mut attempt = 0;

    retry(backoff, || {
        attempt += 1;
        let current = attempt;
        let op = operation();

        async move {
            match op.await {
                Ok(result) => {
                    if current > 1 {
                        info!("{} succeeded on attempt {}", operation_name, current);
                    }
                    Ok(result)
                }
                Err(e) if current <= config.max_retries && is_retryable(&e) => {
                    warn!(
                        "{} failed on attempt {} of {}: {}. Retrying...",
                        operation_name,
                        current,
                        config.max_retries + 1,
                        e
                    );
                    Err(backoff::Error::transient(e))
                }
                Err(e) => {
                    if current > 1 {
                        warn!("{} failed after {} attempts: {}", operation_name, current, e);
                    }
                    Err(backoff::Error::permanent(e))
                }
            }
        }
    })
    .await
}

/// Network failures, 5xx and 429 are worth another attempt; anything else
/// (other 4xx, parse errors, filesystem errors) is not.
pub fn is_retryable(error: &InstallError) -> bool {
    match error {
        InstallError::Http(e) => {
            e.is_timeout()
                || e.is_connect()
                || e.status()
                    .map(|s| s.is_server_error() || s.as_u16() == 429)
                    .unwrap_or(true)
        }
        InstallError::GitHubApi(e) => match e.as_ref() {
            octocrab::Error::GitHub { source, .. } => {
                source.status_code.is_server_error() || source.status_code.as_u16() == 429
            }
            _ => true,
        },
        InstallError::Io(e) => {
            use std::io::ErrorKind;
            matches!(
                e.kind(),
                ErrorKind::ConnectionAborted
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::TimedOut
                    | ErrorKind::Interrupted
                    | ErrorKind::UnexpectedEof
            )
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(50),
            max_elapsed_time: Some(Duration::from_secs(2)),
        }
    }

    fn reset() -> InstallError {
        InstallError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
    }

    #[tokio::test]
    async fn test_retry_on_transient_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = attempt_count.clone();

        let result = with_retry("test operation", &fast(3), || {
            let count = attempt_count_clone.clone();
            async move {
                if count.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(reset())
                } else {
                    Ok("success")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_immediate_success_no_retry() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = attempt_count.clone();

        let result = with_retry("test operation", &RetryConfig::default(), || {
            let count = attempt_count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok("immediate success")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "immediate success");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_max_retries_exceeded() {
        let config = fast(2);
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = attempt_count.clone();

        let result: Result<String> = with_retry("test operation", &config, || {
            let count = attempt_count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err(reset())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), config.max_retries + 1);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = attempt_count.clone();

        let result: Result<()> = with_retry("test operation", &fast(5), || {
            let count = attempt_count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err(InstallError::UnsupportedArchive {
                    file: "x.rar".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(InstallError::UnsupportedArchive { .. })));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_makes_one_attempt() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = attempt_count.clone();

        let result: Result<()> = with_retry("test operation", &RetryConfig::disabled(), || {
            let count = attempt_count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err(reset())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&reset()));
        assert!(!is_retryable(&InstallError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            "File not found",
        ))));
        assert!(!is_retryable(&InstallError::InvalidSource {
            input: "x".to_string()
        }));
    }
}
