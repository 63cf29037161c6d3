use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use xchange_instrument::guard::approx_eq_default;
use xchange_instrument::{Currency, CurrencyClass, CurrencyTable, ProviderId};

use crate::book::{CurrencyMetadata, ProviderStatus, SpotBook};

/// How long a successful Spot fetch keeps a symbol in the tradeable set before
/// it is considered stale and due for a lazy refresh (spec §3 "Tradeable
/// set ... stale after one hour").
const TRADEABLE_SET_TTL: Duration = Duration::from_secs(60 * 60);

fn base_asset_from_symbol(symbol: &str) -> Option<Currency> {
    symbol
        .strip_suffix("USDT")
        .filter(|base| !base.is_empty())
        .map(Currency::new)
}

struct Inner {
    spot_books: FnvHashMap<String, SpotBook>,
    last_seen_spot: FnvHashMap<String, SpotBook>,
    fiat_rates: FnvHashMap<Currency, Decimal>,
    last_seen_fiat: FnvHashMap<Currency, Decimal>,
    currency_metadata: FnvHashMap<Currency, CurrencyMetadata>,
    tradeable_pairs: FnvHashMap<String, bool>,
    tradeable_set_refreshed_at: Option<Instant>,
    provider_last_update: HashMap<ProviderId, DateTime<Utc>>,
    provider_status: HashMap<ProviderId, ProviderStatus>,
    currency_table: CurrencyTable,
}

/// Thread-safe store of the latest rates from all three providers (spec §4.4
/// / C5). A single reader/writer lock guards every map so a publication is
/// visible atomically: readers never observe a half-updated batch.
///
/// Grounded on `jackbot_data::books::map::OrderBookMapMulti`'s lock
/// discipline (`Arc<RwLock<_>>` over a `FnvHashMap`), generalized here to one
/// lock covering every map rather than one lock per symbol, per spec §4.4.
pub struct RateCache {
    inner: RwLock<Inner>,
}

impl std::fmt::Debug for RateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateCache").finish_non_exhaustive()
    }
}

impl RateCache {
    pub fn new(currency_table: CurrencyTable) -> Self {
        Self {
            inner: RwLock::new(Inner {
                spot_books: FnvHashMap::default(),
                last_seen_spot: FnvHashMap::default(),
                fiat_rates: FnvHashMap::default(),
                last_seen_fiat: FnvHashMap::default(),
                currency_metadata: FnvHashMap::default(),
                tradeable_pairs: FnvHashMap::default(),
                tradeable_set_refreshed_at: None,
                provider_last_update: HashMap::new(),
                provider_status: HashMap::new(),
                currency_table,
            }),
        }
    }

    /// Classify a currency using the cache's currency table (spec §3, §4.8).
    pub fn classify(&self, currency: &Currency) -> CurrencyClass {
        self.inner.read().currency_table.classify(currency)
    }

    pub fn bridge_fiat(&self) -> Currency {
        self.inner.read().currency_table.bridge_fiat().clone()
    }

    pub fn bridge_crypto(&self) -> Currency {
        self.inner.read().currency_table.bridge_crypto().clone()
    }

    pub fn treat_usd_usdt_as_alias(&self) -> bool {
        self.inner.read().currency_table.treat_usd_usdt_as_alias
    }

    /// Defensive copy of the requested [`SpotBook`] — callers never alias the
    /// cache's internal storage (spec §4.4 "Readers receive defensive
    /// copies").
    pub fn get_spot(&self, symbol: &str) -> Option<SpotBook> {
        self.inner.read().spot_books.get(symbol).cloned()
    }

    /// Resolve a `from -> to` fiat rate, handling the base/inverse/cross cases
    /// described in spec §3 (`FiatRate`): every stored rate is `USD ->
    /// target`, so `USD -> X` is a direct lookup, `X -> USD` is the inverse,
    /// and `X -> Y` is the cross `rate(Y) / rate(X)`.
    pub fn get_fiat_rate(&self, from: &Currency, to: &Currency) -> Option<Decimal> {
        let inner = self.inner.read();
        if from.as_str() == "USD" && to.as_str() == "USD" {
            return Some(Decimal::ONE);
        }
        if from.as_str() == "USD" {
            return inner.fiat_rates.get(to).copied();
        }
        if to.as_str() == "USD" {
            let rate = inner.fiat_rates.get(from).copied()?;
            if rate.is_zero() {
                return None;
            }
            return Some(Decimal::ONE / rate);
        }
        let rate_from = inner.fiat_rates.get(from).copied()?;
        let rate_to = inner.fiat_rates.get(to).copied()?;
        if rate_from.is_zero() {
            return None;
        }
        Some(rate_to / rate_from)
    }

    pub fn get_metadata(&self, code: &Currency) -> Option<CurrencyMetadata> {
        self.inner.read().currency_metadata.get(code).copied()
    }

    /// `true` iff `symbol` has ever produced a well-formed Spot order book
    /// within the tradeable-set TTL (spec §3 "Tradeable pair").
    pub fn is_tradeable(&self, symbol: &str) -> bool {
        let inner = self.inner.read();
        let fresh = inner
            .tradeable_set_refreshed_at
            .is_some_and(|t| t.elapsed() < TRADEABLE_SET_TTL);
        fresh && inner.tradeable_pairs.get(symbol).copied().unwrap_or(false)
    }

    pub fn tradeable_set_is_stale(&self) -> bool {
        let inner = self.inner.read();
        !inner
            .tradeable_set_refreshed_at
            .is_some_and(|t| t.elapsed() < TRADEABLE_SET_TTL)
    }

    /// Wall-clock age of the most recent successful publication per provider
    /// (spec §4.4 `cacheStaleness`). A provider that has never published is
    /// reported as `None` (infinitely stale).
    pub fn cache_staleness(&self) -> HashMap<ProviderId, Option<Duration>> {
        let inner = self.inner.read();
        let now = Utc::now();
        ProviderId::ALL
            .into_iter()
            .map(|provider| {
                let age = inner
                    .provider_last_update
                    .get(&provider)
                    .and_then(|last| (now - *last).to_std().ok());
                (provider, age)
            })
            .collect()
    }

    /// `true` iff any provider's staleness exceeds its critical threshold,
    /// including providers that have never successfully published (spec §4.4
    /// `isStale`, §8 "`isStale()` ⇒ `ageOf(p) > criticalThreshold(p)` for at
    /// least one required provider").
    pub fn is_stale(&self) -> bool {
        self.cache_staleness().into_iter().any(|(provider, age)| {
            age.is_none_or(|age| age > provider.critical_staleness())
        })
    }

    /// `true` iff `provider`'s staleness exceeds its critical threshold.
    pub fn provider_is_critical(&self, provider: ProviderId) -> bool {
        self.cache_staleness()
            .get(&provider)
            .copied()
            .flatten()
            .is_none_or(|age| age > provider.critical_staleness())
    }

    pub fn provider_status(&self, provider: ProviderId) -> ProviderStatus {
        self.inner
            .read()
            .provider_status
            .get(&provider)
            .cloned()
            .unwrap_or_default()
    }

    /// Publish a batch of freshly fetched [`SpotBook`]s. Returns `true` iff
    /// the batch actually changed anything beyond epsilon tolerance (spec §3
    /// "publication is skipped if all new rates are ε-equal to the previous
    /// set"). The whole batch becomes visible under one write-lock acquisition
    /// (spec §5 "the set of rates becomes visible atomically").
    pub fn publish_spot_batch(&self, books: Vec<SpotBook>) -> bool {
        if books.is_empty() {
            return false;
        }
        let mut inner = self.inner.write();
        let changed = books.iter().any(|book| {
            match inner.last_seen_spot.get(&book.symbol) {
                None => true,
                Some(prev) => {
                    let bid_changed = match (book.best_bid(), prev.best_bid()) {
                        (Some(a), Some(b)) => !approx_eq_default(a.price, b.price),
                        (a, b) => a.is_some() != b.is_some(),
                    };
                    let ask_changed = match (book.best_ask(), prev.best_ask()) {
                        (Some(a), Some(b)) => !approx_eq_default(a.price, b.price),
                        (a, b) => a.is_some() != b.is_some(),
                    };
                    bid_changed || ask_changed
                }
            }
        });

        if !changed {
            return false;
        }

        let now = Utc::now();
        for book in books {
            if let Some(base) = base_asset_from_symbol(&book.symbol) {
                inner.currency_table.register_crypto(base.clone());
                let decimal_places = book
                    .best_ask()
                    .map(|level| level.price.scale())
                    .unwrap_or(0);
                inner.currency_metadata.insert(
                    base,
                    CurrencyMetadata {
                        decimal_places,
                        last_verified: now,
                    },
                );
            }
            inner.tradeable_pairs.insert(book.symbol.clone(), true);
            inner.last_seen_spot.insert(book.symbol.clone(), book.clone());
            inner.spot_books.insert(book.symbol.clone(), book);
        }
        inner.tradeable_set_refreshed_at = Some(Instant::now());
        self.stamp_provider_success_locked(&mut inner, ProviderId::Spot, now);
        true
    }

    /// Publish a batch of `USD -> target` fiat rates. Absent targets retain
    /// their previous value (spec §4.3 "A partial batch is accepted; absent
    /// targets retain previous values").
    pub fn publish_fiat_batch(&self, rates: HashMap<Currency, Decimal>) -> bool {
        if rates.is_empty() {
            return false;
        }
        let mut inner = self.inner.write();
        let changed = rates.iter().any(|(target, rate)| {
            match inner.last_seen_fiat.get(target) {
                None => true,
                Some(prev) => !approx_eq_default(*rate, *prev),
            }
        });

        if !changed {
            return false;
        }

        let now = Utc::now();
        for (target, rate) in rates {
            inner.currency_table.register_fiat(target.clone());
            inner.last_seen_fiat.insert(target.clone(), rate);
            inner.fiat_rates.insert(target, rate);
        }
        self.stamp_provider_success_locked(&mut inner, ProviderId::Fiat, now);
        true
    }

    /// Record that the Bridge provider answered successfully (it has no rate
    /// map of its own to publish into — spec §3 "BridgeQuote is not stored as
    /// a rate" — so this only advances the staleness clock).
    pub fn record_bridge_success(&self) {
        let mut inner = self.inner.write();
        let now = Utc::now();
        self.stamp_provider_success_locked(&mut inner, ProviderId::Bridge, now);
    }

    fn stamp_provider_success_locked(&self, inner: &mut Inner, provider: ProviderId, now: DateTime<Utc>) {
        // lastUpdate is monotonically non-decreasing per provider (spec §3):
        // the write lock is already held and `now` is read once per batch, so
        // ties can only go forward.
        let entry = inner
            .provider_last_update
            .entry(provider)
            .or_insert(now);
        if now >= *entry {
            *entry = now;
        }
        let status = inner.provider_status.entry(provider).or_default();
        status.available = true;
        status.last_error = None;
        status.consecutive_fails = 0;
        status.last_update = Some(now);
    }

    pub fn record_failure(&self, provider: ProviderId, error: impl Into<String>) {
        let mut inner = self.inner.write();
        let status = inner.provider_status.entry(provider).or_default();
        status.consecutive_fails += 1;
        status.last_error = Some(error.into());
        if status.consecutive_fails >= 5 {
            status.available = false;
        }
    }

    /// Hydrate the cache from a persisted snapshot (spec §4.5 load path).
    pub fn hydrate_spot(&self, books: HashMap<String, SpotBook>, last_update: DateTime<Utc>) {
        let mut inner = self.inner.write();
        for (symbol, book) in books {
            if let Some(base) = base_asset_from_symbol(&symbol) {
                inner.currency_table.register_crypto(base);
            }
            inner.tradeable_pairs.insert(symbol.clone(), true);
            inner.last_seen_spot.insert(symbol.clone(), book.clone());
            inner.spot_books.insert(symbol, book);
        }
        inner.tradeable_set_refreshed_at = Some(Instant::now());
        self.stamp_provider_success_locked(&mut inner, ProviderId::Spot, last_update);
    }

    pub fn hydrate_fiat(&self, rates: HashMap<Currency, Decimal>, last_update: DateTime<Utc>) {
        let mut inner = self.inner.write();
        for (target, rate) in rates {
            inner.currency_table.register_fiat(target.clone());
            inner.last_seen_fiat.insert(target.clone(), rate);
            inner.fiat_rates.insert(target, rate);
        }
        self.stamp_provider_success_locked(&mut inner, ProviderId::Fiat, last_update);
    }

    /// Snapshot the current rate maps for persistence (spec §4.5 save path);
    /// takes the reader lock, as writers never need to wait on a save.
    pub fn snapshot_for_persistence(&self) -> (HashMap<String, SpotBook>, HashMap<Currency, Decimal>) {
        let inner = self.inner.read();
        (
            inner.spot_books.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            inner.fiat_rates.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        )
    }

    pub fn provider_last_update(&self, provider: ProviderId) -> Option<DateTime<Utc>> {
        self.inner.read().provider_last_update.get(&provider).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::Level;
    use rust_decimal_macros::dec;
    use xchange_instrument::CurrencyTable;

    fn cache() -> RateCache {
        RateCache::new(CurrencyTable::new(Currency::new("RUB"), Currency::new("TON")))
    }

    fn book(symbol: &str, bid: f64, ask: f64) -> SpotBook {
        SpotBook::from_raw(
            symbol,
            vec![Level::new(Decimal::try_from(bid).unwrap(), dec!(10))],
            vec![Level::new(Decimal::try_from(ask).unwrap(), dec!(10))],
            Utc::now(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn publish_then_get_spot_round_trips() {
        let cache = cache();
        assert!(cache.publish_spot_batch(vec![book("TONUSDT", 4.9, 5.0)]));
        let got = cache.get_spot("TONUSDT").unwrap();
        assert_eq!(got.best_ask().unwrap().price, dec!(5.0));
        assert!(cache.is_tradeable("TONUSDT"));
        assert_eq!(cache.classify(&Currency::new("TON")), CurrencyClass::BridgeCrypto);
    }

    #[test]
    fn identical_batch_is_not_republished() {
        let cache = cache();
        assert!(cache.publish_spot_batch(vec![book("TONUSDT", 4.9, 5.0)]));
        let first_update = cache.provider_last_update(ProviderId::Spot).unwrap();
        assert!(!cache.publish_spot_batch(vec![book("TONUSDT", 4.9, 5.0)]));
        assert_eq!(cache.provider_last_update(ProviderId::Spot).unwrap(), first_update);
    }

    #[test]
    fn fiat_rate_handles_base_inverse_and_cross() {
        let cache = cache();
        let mut rates = HashMap::new();
        rates.insert(Currency::new("EUR"), dec!(0.9));
        rates.insert(Currency::new("GBP"), dec!(0.8));
        assert!(cache.publish_fiat_batch(rates));

        assert_eq!(
            cache.get_fiat_rate(&Currency::new("USD"), &Currency::new("EUR")),
            Some(dec!(0.9))
        );
        assert_eq!(
            cache.get_fiat_rate(&Currency::new("EUR"), &Currency::new("USD")),
            Some(Decimal::ONE / dec!(0.9))
        );
        let cross = cache
            .get_fiat_rate(&Currency::new("EUR"), &Currency::new("GBP"))
            .unwrap();
        assert_eq!(cross, dec!(0.8) / dec!(0.9));
    }

    #[test]
    fn never_fetched_provider_is_stale() {
        let cache = cache();
        assert!(cache.is_stale());
    }

    #[test]
    fn fresh_publication_clears_staleness_for_that_provider() {
        let cache = cache();
        cache.publish_spot_batch(vec![book("TONUSDT", 4.9, 5.0)]);
        assert!(!cache.provider_is_critical(ProviderId::Spot));
    }
}
