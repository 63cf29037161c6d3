#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations
)]

//! # Xchange Integration
//! Low-level resilience primitives shared by every provider fetcher: a typed
//! transport error, a per-provider circuit breaker, a token-bucket rate limiter
//! and a single retry-with-backoff utility. None of these know anything about
//! currencies or exchange rates — that lives in `xchange-data`.

pub mod circuit_breaker;
pub mod error;
pub mod rate_limit;
pub mod retry;

pub use circuit_breaker::CircuitBreaker;
pub use error::SocketError;
pub use rate_limit::RateLimiter;
pub use retry::{retry_with_backoff, RetryPolicy};
