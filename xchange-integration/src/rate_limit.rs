use crate::error::SocketError;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};

struct Waiter {
    tx: oneshot::Sender<()>,
}

struct Inner {
    capacity: usize,
    tokens: usize,
    interval: Duration,
    last_refill: Instant,
    queue: VecDeque<Waiter>,
}

impl Inner {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        if elapsed >= self.interval {
            let periods = elapsed.as_millis() / self.interval.as_millis().max(1);
            let add_tokens = (periods as usize + 1) * self.capacity;
            self.last_refill = now;
            self.tokens = usize::min(self.tokens + add_tokens, self.capacity);
            while self.tokens > 0 {
                match self.queue.pop_front() {
                    Some(waiter) => {
                        self.tokens -= 1;
                        let _ = waiter.tx.send(());
                    }
                    None => break,
                }
            }
        }
    }
}

/// Per-provider token bucket rate limiter (spec §4.2 / C3).
///
/// Every provider fetch calls [`RateLimiter::wait`] before issuing network I/O;
/// the limiter's fill rate and burst are chosen so the background scheduler plus
/// any lazy refresh can never exceed the upstream's published tolerance.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<Inner>>,
}

impl RateLimiter {
    /// Construct a limiter permitting `capacity` requests per `interval`
    /// (i.e. burst = `capacity`, fill rate = `capacity / interval`).
    pub fn new(capacity: usize, interval: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                capacity,
                tokens: capacity,
                interval,
                last_refill: Instant::now(),
                queue: VecDeque::new(),
            })),
        }
    }

    /// Construct a limiter from a requests-per-minute budget, as providers are
    /// configured in spec §4.2.
    pub fn per_minute(requests_per_minute: usize, burst: usize) -> Self {
        let interval = Duration::from_secs(60) / requests_per_minute.max(1) as u32;
        Self::new(burst.max(1), interval)
    }

    /// Acquire a permit, waiting if the bucket is empty. Returns
    /// [`SocketError::Cancelled`] if `cancelled` resolves first.
    pub async fn wait(&self, cancelled: impl std::future::Future<Output = ()>) -> Result<(), SocketError> {
        tokio::pin!(cancelled);
        loop {
            let rx = {
                let mut inner = self.inner.lock().await;
                inner.refill();
                if inner.tokens > 0 {
                    inner.tokens -= 1;
                    None
                } else {
                    let (tx, rx) = oneshot::channel();
                    inner.queue.push_back(Waiter { tx });
                    Some(rx)
                }
            };
            match rx {
                None => return Ok(()),
                Some(rx) => {
                    tokio::select! {
                        _ = rx => return Ok(()),
                        _ = &mut cancelled => return Err(SocketError::Cancelled),
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;
    use tokio::time::{sleep, Instant as TokioInstant};

    #[tokio::test]
    async fn consumes_burst_then_waits_for_refill() {
        let limiter = RateLimiter::new(2, Duration::from_millis(50));
        limiter.wait(pending()).await.unwrap();
        limiter.wait(pending()).await.unwrap();
        let start = TokioInstant::now();
        limiter.wait(pending()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn cancellation_while_queued_returns_cancelled() {
        let limiter = RateLimiter::new(1, Duration::from_secs(5));
        limiter.wait(pending()).await.unwrap();
        let (tx, rx) = oneshot::channel();
        let limiter2 = limiter.clone();
        let handle = tokio::spawn(async move {
            limiter2
                .wait(async {
                    let _ = rx.await;
                })
                .await
        });
        sleep(Duration::from_millis(10)).await;
        tx.send(()).unwrap();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(SocketError::Cancelled)));
    }

    #[tokio::test]
    async fn per_minute_constructor_sets_burst_as_capacity() {
        let limiter = RateLimiter::per_minute(60, 10);
        for _ in 0..10 {
            limiter.wait(pending()).await.unwrap();
        }
    }
}
