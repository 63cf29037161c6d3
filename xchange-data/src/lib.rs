#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations
)]

//! Multi-provider exchange-rate cache: Spot order-book, Fiat cross-rate and
//! Bridge per-amount fetchers behind one concurrency-safe [`RateCache`], a
//! JSON snapshot [`PersistenceWriter`], and a background [`Scheduler`] that
//! keeps the cache warm.

pub mod book;
pub mod cache;
pub mod engine;
pub mod persistence;
pub mod provider;
pub mod scheduler;

pub use book::{CurrencyMetadata, Level, ProviderStatus, SpotBook};
pub use cache::RateCache;
pub use engine::{buy_with_budget, vwap_fill, EngineError, Fill, SpendFill};
pub use persistence::{LoadedSnapshot, PersistenceError, PersistenceWriter};
pub use provider::{BridgeProvider, BridgeQuote, FiatProvider, RestBridgeProvider, RestFiatProvider, RestSpotProvider, SpotProvider};
pub use scheduler::{Scheduler, SchedulerError};
