use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Configuration for [`retry_with_backoff`] (spec §9 "Retry/backoff": "a single
/// utility ... avoids scattered ad-hoc retry loops").
#[derive(Debug, Copy, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: u32,
    pub cap: Duration,
}

impl RetryPolicy {
    /// The scheduler's default policy (spec §4.6): 3 attempts, 1s base,
    /// doubling, capped at 10s.
    pub const SCHEDULER: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_secs(1),
        factor: 2,
        cap: Duration::from_secs(10),
    };

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.saturating_pow(attempt);
        std::cmp::min(self.base_delay.saturating_mul(multiplier), self.cap)
    }
}

/// Retry `operation` up to `policy.max_attempts` times with exponential
/// backoff, aborting early if `cancelled` resolves during a backoff sleep.
///
/// `operation` receives the zero-based attempt index and must return
/// `Ok(retry = false)`-shaped semantics via the `Result` itself: any `Err` is
/// retried (unless it is the last attempt), any `Ok` short-circuits
/// immediately.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: RetryPolicy,
    mut cancelled: impl FnMut() -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        if cancelled() {
            attempt = policy.max_attempts.saturating_sub(1);
        }
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= policy.max_attempts || cancelled() {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt - 1);
                warn!(%err, attempt, ?delay, "retrying after failure");
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            factor: 2,
            cap: Duration::from_millis(5),
        };
        let result: Result<u32, &str> = retry_with_backoff(policy, || false, |attempt| {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if attempt < 2 {
                    Err("boom")
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_returns_last_error() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            factor: 2,
            cap: Duration::from_millis(5),
        };
        let result: Result<u32, &str> =
            retry_with_backoff(policy, || false, |_| async { Err("always") }).await;
        assert_eq!(result, Err("always"));
    }

    #[tokio::test]
    async fn cancellation_stops_retrying() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::SCHEDULER;
        let result: Result<u32, &str> = retry_with_backoff(policy, || true, |_| {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("boom")
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
