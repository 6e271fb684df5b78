//! Fixed-backoff retry for transient upstream failures.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use super::AiError;

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Delay unit; attempt `n` waits `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Run `op`, retrying while it fails with a transient error and retries
    /// remain. Any other error is returned immediately.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, AiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AiError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff * attempt;
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient upstream failure, retrying"
                    );
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn reset() -> AiError {
        AiError::Transport {
            message: "connection reset by peer".into(),
            transient: true,
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(2, Duration::ZERO);

        let result = policy
            .run(|| async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(reset())
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(2, Duration::ZERO);

        let result: Result<(), _> = policy
            .run(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(reset())
            })
            .await;

        assert!(matches!(result, Err(AiError::Transport { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_api_errors_or_timeouts() {
        let policy = RetryPolicy::new(2, Duration::ZERO);

        for err in [
            AiError::Api {
                status: 400,
                message: "bad size".into(),
            },
            AiError::Timeout("deadline".into()),
        ] {
            let calls = AtomicU32::new(0);
            let mut err = Some(err);
            let result: Result<(), _> = policy
                .run(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let err = err.take().unwrap_or(AiError::EmptyImage);
                    async move { Err(err) }
                })
                .await;

            assert!(result.is_err());
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }
}
