//! Bounded exponential-backoff retry for transient remote failures.
//!
//! Scoped to C2 rather than built as a general reliability crate: the
//! engine has no concurrent fan-out to protect, so the token-bucket/circuit-breaker machinery
//! a multi-provider fan-out client would need would be
//! over-engineering here. What's kept is the shape: a small bounded retry
//! budget, honoring a rate-limit retry-after hint when the remote gives one.

use std::time::Duration;

use tracing::warn;

use crate::client::{is_secondary_rate_limit, GitHubError};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn backoff_for(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.saturating_mul(1 << attempt.min(8));
        scaled.min(self.max_delay)
    }
}

/// Retry `op` up to `policy.max_attempts` times. Non-retriable errors
/// (auth, validation, not-found) surface on the first attempt. A
/// `retry_after` hint from the remote (rate limiting) takes precedence
/// over the computed backoff when present.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, GitHubError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, GitHubError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retriable() && attempt + 1 < policy.max_attempts => {
                let delay = retry_after_hint(&e).unwrap_or_else(|| policy.backoff_for(attempt));
                warn!(attempt, ?delay, error = %e, "retrying GitHub call after transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Extract a rate-limit `retry-after` duration from the error, if the
/// remote provided one.
fn retry_after_hint(err: &GitHubError) -> Option<Duration> {
    if let GitHubError::Api(octocrab::Error::GitHub { source, .. }) = err {
        let status = source.status_code.as_u16();
        if status == 429 || (status == 403 && is_secondary_rate_limit(&source.message)) {
            // octocrab surfaces rate-limit bodies without a structured
            // retry-after; fall back to a conservative fixed wait.
            return Some(Duration::from_secs(5));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_without_retry_when_first_call_ok() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<u32, GitHubError> = with_retry(policy, || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff_for(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(10), Duration::from_secs(1));
    }
}
