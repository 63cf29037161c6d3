use async_trait::async_trait;
use rust_decimal::Decimal;
use xchange_integration::SocketError;

use crate::book::SpotBook;

pub mod bridge;
pub mod fiat;
pub mod spot;

pub use bridge::RestBridgeProvider;
pub use fiat::RestFiatProvider;
pub use spot::RestSpotProvider;

/// Resolve a provider's base URL, honoring the environment-variable override
/// described in spec §6 "Environment: provider endpoint URLs overridable by
/// environment variables".
pub fn base_url(env_var: &str, default: &str) -> String {
    std::env::var(env_var).unwrap_or_else(|_| default.to_string())
}

/// Order-book provider pricing [`xchange_instrument::CurrencyClass::Crypto`]
/// against USDT (spec §4.3 "Spot fetcher").
#[async_trait]
pub trait SpotProvider: Send + Sync {
    /// Fetch a single symbol's order book at `depth` levels per side.
    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<SpotBook, SocketError>;
}

/// USD cross-rate provider pricing [`xchange_instrument::CurrencyClass::Fiat`]
/// currencies (spec §4.3 "Fiat fetcher").
#[async_trait]
pub trait FiatProvider: Send + Sync {
    /// Fetch the `USD -> target` conversion rate.
    async fn fetch_rate(&self, target: &str) -> Result<Decimal, SocketError>;
}

/// The output of a Bridge per-amount quote (spec §3 "`BridgeQuote` is not
/// stored as a rate").
#[derive(Debug, Clone, Copy)]
pub struct BridgeQuote {
    pub output_amount: Decimal,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

/// Per-amount quote provider bridging
/// [`xchange_instrument::CurrencyClass::BridgeFiat`] and
/// [`xchange_instrument::CurrencyClass::BridgeCrypto`] (spec §4.3
/// "Bridge fetcher").
#[async_trait]
pub trait BridgeProvider: Send + Sync {
    async fn fetch_quote(
        &self,
        from: &str,
        to: &str,
        input_amount: Decimal,
    ) -> Result<BridgeQuote, SocketError>;
}
