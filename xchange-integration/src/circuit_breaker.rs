use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Number of consecutive failures in [`State::Closed`] that trips the breaker
/// open (spec §4.1).
const FAILURE_THRESHOLD: u32 = 5;
/// How long the breaker stays open before allowing a probe call.
const OPEN_DURATION: Duration = Duration::from_secs(5 * 60);
/// Bounded number of calls permitted while half-open.
const HALF_OPEN_BUDGET: u32 = 3;
/// Consecutive half-open successes required to close the breaker.
const HALF_OPEN_SUCCESSES_TO_CLOSE: u32 = 2;

/// The three states a per-provider circuit breaker can be in (spec §4.1 / C2).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: State,
    consecutive_failures: u32,
    consecutive_half_open_successes: u32,
    half_open_attempts: u32,
    open_until: Option<Instant>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: State::Closed,
            consecutive_failures: 0,
            consecutive_half_open_successes: 0,
            half_open_attempts: 0,
            open_until: None,
        }
    }

    /// Re-evaluate `Open -> HalfOpen` based on wall-clock time, without
    /// consuming a half-open attempt. Call before every permission check.
    fn tick(&mut self, now: Instant) {
        if self.state == State::Open {
            if let Some(open_until) = self.open_until {
                if now >= open_until {
                    self.state = State::HalfOpen;
                    self.half_open_attempts = 0;
                    self.consecutive_half_open_successes = 0;
                }
            }
        }
    }
}

/// Per-provider circuit breaker wrapped around every fetch (spec §4.1).
///
/// A refused call never performs network I/O: [`CircuitBreaker::try_acquire`]
/// returns `false` immediately while open, which the caller surfaces as
/// [`crate::error::SocketError::BreakerOpen`].
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("state", &inner.state)
            .field("consecutive_failures", &inner.consecutive_failures)
            .finish()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new())),
        }
    }

    /// Current breaker state, after lazily advancing `Open -> HalfOpen` if the
    /// cooldown has elapsed.
    pub fn state(&self) -> State {
        let mut inner = self.inner.lock();
        inner.tick(Instant::now());
        inner.state
    }

    /// Ask permission to make a call. Returns `false` without side effects if
    /// the breaker is open, or if the half-open attempt budget is exhausted.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.tick(Instant::now());
        match inner.state {
            State::Closed => true,
            State::Open => false,
            State::HalfOpen => {
                if inner.half_open_attempts < HALF_OPEN_BUDGET {
                    inner.half_open_attempts += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record the outcome of a call that [`try_acquire`](Self::try_acquire)
    /// permitted.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => {
                inner.consecutive_failures = 0;
            }
            State::HalfOpen => {
                inner.consecutive_half_open_successes += 1;
                if inner.consecutive_half_open_successes >= HALF_OPEN_SUCCESSES_TO_CLOSE {
                    inner.state = State::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_half_open_successes = 0;
                    inner.open_until = None;
                }
            }
            State::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= FAILURE_THRESHOLD {
                    inner.state = State::Open;
                    inner.open_until = Some(Instant::now() + OPEN_DURATION);
                }
            }
            State::HalfOpen => {
                inner.state = State::Open;
                inner.open_until = Some(Instant::now() + OPEN_DURATION);
                inner.consecutive_half_open_successes = 0;
            }
            State::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_five_consecutive_failures() {
        let breaker = CircuitBreaker::new();
        for _ in 0..4 {
            assert!(breaker.try_acquire());
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), State::Closed);
        assert!(breaker.try_acquire());
        breaker.record_failure();
        assert_eq!(breaker.state(), State::Open);
    }

    #[test]
    fn open_breaker_refuses_calls_without_io() {
        let breaker = CircuitBreaker::new();
        for _ in 0..5 {
            breaker.try_acquire();
            breaker.record_failure();
        }
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn half_open_single_failure_reopens() {
        let breaker = CircuitBreaker::new();
        for _ in 0..5 {
            breaker.try_acquire();
            breaker.record_failure();
        }
        // Force transition to half-open by rewriting the cooldown directly.
        {
            let mut inner = breaker.inner.lock();
            inner.open_until = Some(Instant::now() - Duration::from_millis(1));
        }
        assert_eq!(breaker.state(), State::HalfOpen);
        assert!(breaker.try_acquire());
        breaker.record_failure();
        assert_eq!(breaker.state(), State::Open);
    }

    #[test]
    fn half_open_two_successes_close() {
        let breaker = CircuitBreaker::new();
        for _ in 0..5 {
            breaker.try_acquire();
            breaker.record_failure();
        }
        {
            let mut inner = breaker.inner.lock();
            inner.open_until = Some(Instant::now() - Duration::from_millis(1));
        }
        assert_eq!(breaker.state(), State::HalfOpen);
        assert!(breaker.try_acquire());
        breaker.record_success();
        assert_eq!(breaker.state(), State::HalfOpen);
        assert!(breaker.try_acquire());
        breaker.record_success();
        assert_eq!(breaker.state(), State::Closed);
    }

    #[test]
    fn half_open_budget_is_bounded() {
        let breaker = CircuitBreaker::new();
        for _ in 0..5 {
            breaker.try_acquire();
            breaker.record_failure();
        }
        {
            let mut inner = breaker.inner.lock();
            inner.open_until = Some(Instant::now() - Duration::from_millis(1));
        }
        assert_eq!(breaker.state(), State::HalfOpen);
        for _ in 0..HALF_OPEN_BUDGET {
            assert!(breaker.try_acquire());
        }
        assert!(!breaker.try_acquire());
    }
}
