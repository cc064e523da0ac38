use std::future::Future;
use std::time::Duration;

use crate::error::{GatewayError, Result};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 总调用次数上限（含首次）
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

// 显式状态机取代递归重试：
//   Attempting -> Succeeded
//   Attempting -> FailedFatal（不可重试错误）
//   Attempting -> Waiting（可重试且仍有余量）-> Attempting（计时器到期）
//   Attempting -> FailedExhausted（次数用尽）
enum RetryState<T> {
    Attempting(u32),
    Waiting(u32, Duration),
    Succeeded(T),
    FailedFatal(GatewayError),
    FailedExhausted(GatewayError),
}

pub async fn retry_with_backoff<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut state = RetryState::Attempting(0);
    loop {
        state = match state {
            RetryState::Attempting(attempt) => match operation().await {
                Ok(value) => RetryState::Succeeded(value),
                Err(e) if !e.is_retryable() => RetryState::FailedFatal(e),
                Err(e) if attempt + 1 >= policy.max_retries => RetryState::FailedExhausted(e),
                Err(e) => {
                    let delay = policy.base_delay * 2u32.pow(attempt);
                    tracing::warn!(
                        "Attempt {}/{} failed, retrying in {:?}: {}",
                        attempt + 1,
                        policy.max_retries,
                        delay,
                        e
                    );
                    RetryState::Waiting(attempt, delay)
                }
            },
            RetryState::Waiting(attempt, delay) => {
                // 协作式等待，不阻塞 worker
                tokio::time::sleep(delay).await;
                RetryState::Attempting(attempt + 1)
            }
            RetryState::Succeeded(value) => return Ok(value),
            RetryState::FailedFatal(e) => return Err(e),
            RetryState::FailedExhausted(e) => {
                tracing::warn!("Giving up after {} attempts: {}", policy.max_retries, e);
                return Err(e);
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn policy(base_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(base_ms),
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = retry_with_backoff(&policy(1), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, GatewayError>(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retryable_error_invokes_exactly_max_retries_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let started = Instant::now();
        let result = retry_with_backoff(&policy(10), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(GatewayError::Provider("upstream timeout".into()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 两次等待：10ms·2^0 + 10ms·2^1
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn non_retryable_error_fails_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = retry_with_backoff(&policy(1), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(GatewayError::Provider("quota exceeded".into()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = retry_with_backoff(&policy(1), || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(GatewayError::Stream("connection reset".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
