use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Identifies one of the three heterogeneous upstream feeds the rate cache
/// aggregates. Kept as a small closed enum (rather than a string) so breaker,
/// limiter and staleness state can be indexed with an array instead of a map.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, Deserialize, Serialize)]
pub enum ProviderId {
    /// Order-book provider pricing [`crate::CurrencyClass::Crypto`] against USDT.
    Spot,
    /// USD cross-rate provider pricing [`crate::CurrencyClass::Fiat`] currencies.
    Fiat,
    /// Per-amount quote provider bridging [`crate::CurrencyClass::BridgeFiat`] and
    /// [`crate::CurrencyClass::BridgeCrypto`].
    Bridge,
}

impl ProviderId {
    /// All providers, in a stable order used for iteration in the scheduler and
    /// health reporting.
    pub const ALL: [ProviderId; 3] = [ProviderId::Spot, ProviderId::Fiat, ProviderId::Bridge];

    /// Critical staleness threshold past which the cache refuses to price a leg
    /// that requires this provider (spec §4.4).
    pub fn critical_staleness(self) -> std::time::Duration {
        match self {
            ProviderId::Spot | ProviderId::Bridge => std::time::Duration::from_secs(15 * 60),
            ProviderId::Fiat => std::time::Duration::from_secs(60 * 60),
        }
    }

    /// Background scheduler refresh interval (spec §4.6).
    pub fn refresh_interval(self) -> std::time::Duration {
        match self {
            ProviderId::Spot | ProviderId::Bridge => std::time::Duration::from_secs(5 * 60),
            ProviderId::Fiat => std::time::Duration::from_secs(15 * 60),
        }
    }
}
