#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations
)]

//! # Xchange Instrument
//! Core currency and provider identity primitives shared by every other crate in the
//! exchange-rate core. Deliberately dependency-light: other crates build caches,
//! fetchers and routing logic on top of the types defined here.

/// Currency codes, classification (`Crypto`/`Fiat`/`Bridge*`) and the lookup table
/// the conversion router uses to classify an arbitrary symbol.
pub mod currency;

/// Identifies the three upstream feeds (`Spot`, `Fiat`, `Bridge`) this core
/// aggregates, independent of any single concrete HTTP integration.
pub mod provider;

/// Numeric guards: positivity/finiteness checks and epsilon-tolerant equality over
/// [`rust_decimal::Decimal`].
pub mod guard;

pub use currency::{Currency, CurrencyClass, CurrencyTable};
pub use provider::ProviderId;
