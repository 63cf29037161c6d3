use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use xchange_instrument::guard::is_positive;

/// One `(price, size)` rung of a depth ladder. Adapted from
/// `jackbot_data::books::Level`, dropping the L2-sequencing fields a polled
/// (rather than streamed) order book never needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Level {
    pub price: Decimal,
    pub size: Decimal,
}

impl Level {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }

    /// `true` iff both price and size are strictly positive (spec §8 universal
    /// invariant "all ladder entries satisfy price > 0 ∧ size > 0").
    pub fn is_valid(&self) -> bool {
        is_positive(self.price) && is_positive(self.size)
    }

    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }
}

/// A normalised Spot order-book snapshot (spec §3 `SpotBook`).
///
/// `bids` are sorted best-first (descending), `asks` best-first (ascending).
/// Invariant: `best_bid() <= best_ask()`, enforced by [`SpotBook::validate`]
/// before a fetch is ever published to the cache.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SpotBook {
    pub symbol: String,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    pub last_update: DateTime<Utc>,
    pub volume_24h: Option<Decimal>,
}

impl SpotBook {
    pub fn best_bid(&self) -> Option<Level> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<Level> {
        self.asks.first().copied()
    }

    /// Build a [`SpotBook`] from raw, potentially malformed, upstream levels:
    /// filters entries failing [`Level::is_valid`], sorts best-first, and
    /// rejects the book entirely if either side ends up empty or crossed
    /// (spec §4.3 "filters entries failing positivity/finiteness checks,
    /// rejects empty books").
    pub fn from_raw(
        symbol: impl Into<String>,
        raw_bids: Vec<Level>,
        raw_asks: Vec<Level>,
        last_update: DateTime<Utc>,
        volume_24h: Option<Decimal>,
    ) -> Option<Self> {
        let mut bids: Vec<Level> = raw_bids.into_iter().filter(Level::is_valid).collect();
        let mut asks: Vec<Level> = raw_asks.into_iter().filter(Level::is_valid).collect();
        if bids.is_empty() || asks.is_empty() {
            return None;
        }
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        let book = SpotBook {
            symbol: symbol.into(),
            bids,
            asks,
            last_update,
            volume_24h,
        };
        book.validate().then_some(book)
    }

    /// `true` iff `best_bid <= best_ask` (spec §8 universal invariant).
    pub fn validate(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price <= ask.price,
            _ => false,
        }
    }
}

/// Per-symbol decimal precision and verification bookkeeping the Spot fetcher
/// updates on every successful publication (spec §4.3 "crypto metadata
/// (decimal places, lastVerified)").
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct CurrencyMetadata {
    pub decimal_places: u32,
    pub last_verified: DateTime<Utc>,
}

/// Per-provider health flags (spec §3 `ProviderStatus`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProviderStatus {
    pub available: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_fails: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn lvl(p: f64, s: f64) -> Level {
        Level::new(Decimal::try_from(p).unwrap(), Decimal::try_from(s).unwrap())
    }

    #[test]
    fn from_raw_sorts_and_filters_invalid_levels() {
        let book = SpotBook::from_raw(
            "TONUSDT",
            vec![lvl(4.9, 100.0), lvl(5.0, 50.0), lvl(-1.0, 10.0)],
            vec![lvl(5.2, 30.0), lvl(5.1, 0.0), lvl(5.15, 20.0)],
            Utc::now(),
            None,
        )
        .unwrap();
        assert_eq!(book.bids[0].price, dec!(5.0));
        assert_eq!(book.bids[1].price, dec!(4.9));
        assert_eq!(book.asks[0].price, dec!(5.15));
        assert_eq!(book.asks[1].price, dec!(5.2));
        assert!(book.validate());
    }

    #[test]
    fn from_raw_rejects_empty_side() {
        let book = SpotBook::from_raw("TONUSDT", vec![], vec![lvl(5.0, 1.0)], Utc::now(), None);
        assert!(book.is_none());
    }

    #[test]
    fn from_raw_rejects_crossed_book() {
        let book = SpotBook::from_raw(
            "TONUSDT",
            vec![lvl(6.0, 1.0)],
            vec![lvl(5.0, 1.0)],
            Utc::now(),
            None,
        );
        assert!(book.is_none());
    }
}
