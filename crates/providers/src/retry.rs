//! Retry with exponential backoff and jitter
//!
//! Only transient provider failures are retried; validation and
//! permanent provider errors surface immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use leadline_core::{Error, Result};

/// Backoff schedule for one provider call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `n` (0-based retry index), with ±20% jitter
    /// so concurrent callers fan out.
    fn delay(&self, retry: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2_u32.saturating_pow(retry))
            .min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.8..1.2);
        exp.mul_f64(jitter)
    }
}

/// Run `op` under the policy, retrying transient failures.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay(attempt);
                warn!(
                    op = op_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Map a reqwest failure onto the provider error taxonomy. Timeouts and
/// connection errors are transient; everything else is permanent.
pub fn classify_reqwest(provider: &'static str, err: reqwest::Error) -> Error {
    if err.is_timeout() || err.is_connect() {
        Error::transient(provider, err.to_string())
    } else {
        Error::permanent(provider, err.to_string())
    }
}

/// Map an HTTP status onto the taxonomy: 5xx and 429 are transient.
pub fn classify_status(provider: &'static str, status: reqwest::StatusCode, body: &str) -> Error {
    let message = format!("HTTP {status}: {body}");
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        Error::transient(provider, message)
    } else {
        Error::permanent(provider, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(fast_policy(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::transient("test", "flaky"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(fast_policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::permanent("test", "bad request")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(fast_policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::transient("test", "always down")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        // Jitter is ±20%, so bounds are generous.
        assert!(policy.delay(0) <= Duration::from_millis(120));
        assert!(policy.delay(4) <= Duration::from_millis(600));
    }
}
