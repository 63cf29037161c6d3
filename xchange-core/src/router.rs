use fnv::FnvHashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::{Duration, Instant};
use xchange_data::engine::{buy_with_budget, vwap_fill, LARGE_ORDER_THRESHOLD};
use xchange_data::provider::BridgeProvider;
use xchange_data::RateCache;
use xchange_instrument::guard::is_positive;
use xchange_instrument::{Currency, CurrencyClass, ProviderId};
use xchange_integration::{retry_with_backoff, CircuitBreaker, RetryPolicy};

use crate::error::CoreError;

/// Spot trading fee applied on every `{asset}USDT` leg (spec §4.8).
pub const FEE_SPOT: Decimal = dec!(0.001);
/// Fee applied converting USDT <-> USD through the card rail (spec §4.8).
pub const FEE_CARD: Decimal = dec!(0.01);
/// Fee applied converting a fiat currency <-> USD (spec §4.8).
pub const FEE_FIAT_CARD: Decimal = dec!(0.02);
/// Fixed withdrawal cost, in BRIDGE_CRYPTO units, leaving the Bridge provider
/// toward the Spot venue.
pub const WITHDRAWAL_TO_SPOT: Decimal = dec!(0.0025);
/// Fixed withdrawal cost, in BRIDGE_CRYPTO units, re-entering the Bridge
/// provider after a non-Bridge leg.
pub const WITHDRAWAL_TO_BRIDGE: Decimal = dec!(0.02);

const RESULT_CACHE_TTL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Destination {
    Spot,
    Bridge,
}

#[derive(Debug, Clone)]
enum LegSpec {
    /// Trade `base` against USDT. `selling_base = true` means base -> USDT
    /// (hits the bid side); `false` means USDT -> base (hits the ask side).
    Spot { base: Currency, selling_base: bool },
    /// USDT <-> USD through the card rail. `selling_usdt = true` means
    /// USDT -> USD.
    Card { selling_usdt: bool },
    /// `fiat` <-> USD. `to_usd = true` means fiat -> USD.
    Fiat { fiat: Currency, to_usd: bool },
    /// A live Bridge per-amount quote between two concrete currency codes.
    Bridge { from: Currency, to: Currency },
    /// Subtract the fixed withdrawal cost, in BRIDGE_CRYPTO units, before
    /// continuing the route toward `destination`.
    Withdraw { destination: Destination },
}

/// One priced hop in a route, retained for the answer formatter's rate
/// display and slippage warning (spec §4.11).
#[derive(Debug, Clone, Copy)]
pub struct PricedLeg {
    pub input: Decimal,
    pub output: Decimal,
    pub slippage_pct: Option<Decimal>,
}

/// Outcome of a full conversion (spec §4.8).
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub from: Currency,
    pub to: Currency,
    pub input_amount: Decimal,
    pub final_amount: Decimal,
    /// `final_amount / input_amount`, i.e. how much `to` one unit of `from`
    /// buys — the formatter re-orients this for display (spec §4.11).
    pub effective_rate: Decimal,
    pub legs: Vec<PricedLeg>,
}

impl ConversionResult {
    pub fn max_slippage_pct(&self) -> Option<Decimal> {
        self.legs.iter().filter_map(|leg| leg.slippage_pct).max()
    }
}

struct CachedEntry {
    result: ConversionResult,
    cached_at: Instant,
}

/// Bucket an amount so nearby requests (e.g. `100` vs `100.0001`) share a
/// cache entry. Rounding to 4 significant digits keeps the bucket tight
/// enough that fee math stays materially unaffected while still collapsing
/// noisy duplicate traffic.
fn bucket_amount(amount: Decimal) -> Decimal {
    if amount.is_zero() {
        return Decimal::ZERO;
    }
    let magnitude = amount.abs().log10().floor();
    let scale = Decimal::TEN.powd(magnitude - dec!(3));
    if scale.is_zero() {
        return amount;
    }
    (amount / scale).round() * scale
}

fn cache_key(from: &Currency, to: &Currency, amount: Decimal) -> String {
    format!("{}:{}:{}", from.as_str(), to.as_str(), bucket_amount(amount))
}

/// Separate reader/writer lock over the conversion-result cache (spec §5
/// "Conversion result cache: separate reader/writer lock; lazy eviction runs
/// under the exclusive lock").
struct ResultCache {
    entries: RwLock<FnvHashMap<String, CachedEntry>>,
}

impl ResultCache {
    fn new() -> Self {
        Self { entries: RwLock::new(FnvHashMap::default()) }
    }

    fn get(&self, key: &str) -> Option<ConversionResult> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|entry| entry.cached_at.elapsed() < RESULT_CACHE_TTL)
            .map(|entry| entry.result.clone())
    }

    fn put(&self, key: String, result: ConversionResult) {
        let mut entries = self.entries.write();
        entries.retain(|_, entry| entry.cached_at.elapsed() < RESULT_CACHE_TTL);
        entries.insert(key, CachedEntry { result, cached_at: Instant::now() });
    }
}

/// Maps an arbitrary `(from, to, amount)` triple to a concrete sequence of
/// priced legs and executes it (spec §4.8, C9).
///
/// Grounded on `jackbot_execution`'s order-routing shape (classify -> plan ->
/// execute leg-by-leg), generalized from "route an order to a venue" to
/// "route a conversion across three heterogeneous rails".
pub struct Router {
    cache: Arc<RateCache>,
    bridge: Arc<dyn BridgeProvider>,
    bridge_breaker: CircuitBreaker,
    result_cache: ResultCache,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").finish_non_exhaustive()
    }
}

impl Router {
    pub fn new(cache: Arc<RateCache>, bridge: Arc<dyn BridgeProvider>) -> Self {
        Self {
            cache,
            bridge,
            bridge_breaker: CircuitBreaker::new(),
            result_cache: ResultCache::new(),
        }
    }

    /// Convert `amount` of `from` into `to`. Identity conversions (same
    /// currency on both sides) return the input unchanged without touching
    /// the route table or the cache (spec §4.8 "Identity conversion returns
    /// the input amount unchanged").
    #[tracing::instrument(skip(self), fields(%from, %to, %amount))]
    pub async fn convert(&self, from: &Currency, to: &Currency, amount: Decimal) -> Result<ConversionResult, CoreError> {
        if !is_positive(amount) {
            return Err(CoreError::InvalidAmount(amount.to_string()));
        }

        if from == to {
            return Ok(ConversionResult {
                from: from.clone(),
                to: to.clone(),
                input_amount: amount,
                final_amount: amount,
                effective_rate: Decimal::ONE,
                legs: Vec::new(),
            });
        }

        let key = cache_key(from, to, amount);
        if let Some(cached) = self.result_cache.get(&key) {
            return Ok(cached);
        }

        let from_class = self.cache.classify(from);
        let to_class = self.cache.classify(to);
        if !from_class.is_known() {
            return Err(CoreError::UnknownCurrency(from.clone()));
        }
        if !to_class.is_known() {
            return Err(CoreError::UnknownCurrency(to.clone()));
        }

        let legs_spec = plan_route(from, to, from_class, to_class, &self.cache.bridge_fiat(), &self.cache.bridge_crypto())
            .ok_or_else(|| CoreError::NoRoute { from: from.clone(), to: to.clone() })?;
        tracing::debug!(leg_count = legs_spec.len(), "route resolved");

        // The Bridge leg always performs a live per-amount fetch, so its own
        // cache-staleness clock (only advanced by successful calls) is not a
        // meaningful gate here — the breaker already protects it. Only Spot
        // and Fiat rely on previously cached rates going stale.
        let cache_backed_providers: Vec<ProviderId> = required_providers(&legs_spec)
            .into_iter()
            .filter(|p| *p != ProviderId::Bridge)
            .collect();
        if !cache_backed_providers.is_empty()
            && cache_backed_providers.iter().all(|p| self.cache.provider_is_critical(*p))
        {
            return Err(CoreError::RatesOutdated);
        }

        let mut running = amount;
        let mut priced_legs = Vec::with_capacity(legs_spec.len());
        for leg in &legs_spec {
            let input = running;
            let (output, slippage_pct) = self.execute_leg(leg, input).await?;
            priced_legs.push(PricedLeg { input, output, slippage_pct });
            running = output;
        }

        let effective_rate = if amount.is_zero() { Decimal::ZERO } else { running / amount };
        let result = ConversionResult {
            from: from.clone(),
            to: to.clone(),
            input_amount: amount,
            final_amount: running,
            effective_rate,
            legs: priced_legs,
        };

        self.result_cache.put(key, result.clone());
        Ok(result)
    }

    /// Expose the shared result cache to the inverse solver, which stores its
    /// converged answers under an `"inverse_"`-prefixed key (spec §4.9
    /// "Results are cached with an `inverse_` prefix").
    pub fn cached_inverse(&self, from: &Currency, to: &Currency, target_output: Decimal) -> Option<ConversionResult> {
        self.result_cache.get(&format!("inverse_{}", cache_key(from, to, target_output)))
    }

    pub fn cache_inverse(&self, from: &Currency, to: &Currency, target_output: Decimal, result: ConversionResult) {
        self.result_cache
            .put(format!("inverse_{}", cache_key(from, to, target_output)), result);
    }

    /// `true` iff the route from `from` to `to` touches the Bridge provider,
    /// which determines the inverse solver's strategy (spec §4.9).
    /// Classify a currency against the route table (spec §3). Exposed so
    /// callers building answers can orient rate lines without reaching past
    /// the router into the cache directly.
    pub fn classify(&self, currency: &Currency) -> CurrencyClass {
        self.cache.classify(currency)
    }

    /// The BRIDGE_FIAT currency this router's cache was configured with,
    /// used by callers choosing a default target list for single-currency
    /// queries (spec §4.10 shape 6).
    pub fn bridge_fiat(&self) -> Currency {
        self.cache.bridge_fiat()
    }

    pub fn route_touches_bridge(&self, from: &Currency, to: &Currency) -> bool {
        let from_class = self.cache.classify(from);
        let to_class = self.cache.classify(to);
        matches!(
            plan_route(from, to, from_class, to_class, &self.cache.bridge_fiat(), &self.cache.bridge_crypto()),
            Some(legs) if legs.iter().any(|leg| matches!(leg, LegSpec::Bridge { .. }))
        )
    }

    async fn execute_leg(&self, leg: &LegSpec, input: Decimal) -> Result<(Decimal, Option<Decimal>), CoreError> {
        match leg {
            LegSpec::Spot { base, selling_base } => self.execute_spot_leg(base, *selling_base, input),
            LegSpec::Card { selling_usdt } => {
                let _ = selling_usdt;
                Ok((input * (Decimal::ONE - FEE_CARD), None))
            }
            LegSpec::Fiat { fiat, to_usd } => self.execute_fiat_leg(fiat, *to_usd, input),
            LegSpec::Bridge { from, to } => self.execute_bridge_leg(from, to, input).await,
            LegSpec::Withdraw { destination } => {
                let cost = match destination {
                    Destination::Spot => WITHDRAWAL_TO_SPOT,
                    Destination::Bridge => WITHDRAWAL_TO_BRIDGE,
                };
                let remainder = input - cost;
                if remainder <= Decimal::ZERO {
                    return Err(CoreError::AmountTooSmall { remainder });
                }
                Ok((remainder, None))
            }
        }
    }

    fn execute_spot_leg(&self, base: &Currency, selling_base: bool, input: Decimal) -> Result<(Decimal, Option<Decimal>), CoreError> {
        if self.cache.provider_is_critical(ProviderId::Spot) {
            return Err(CoreError::ProviderUnavailable { provider: ProviderId::Spot });
        }
        let symbol = format!("{}USDT", base.as_str());
        let book = self
            .cache
            .get_spot(&symbol)
            .ok_or_else(|| CoreError::NoRoute { from: base.clone(), to: Currency::new("USDT") })?;

        if selling_base {
            let best = book.best_bid().ok_or(CoreError::AmountTooLarge)?;
            let notional = input * best.price;
            let (raw_output, slippage) = if notional > LARGE_ORDER_THRESHOLD {
                let fill = vwap_fill(&book.bids, input)?;
                (fill.total_cost, Some(fill.slippage_pct()))
            } else {
                (input * best.price, Some(Decimal::ZERO))
            };
            Ok((raw_output * (Decimal::ONE - FEE_SPOT), slippage))
        } else {
            let best = book.best_ask().ok_or(CoreError::AmountTooLarge)?;
            let notional = input;
            let (raw_output, slippage) = if notional > LARGE_ORDER_THRESHOLD {
                let fill = buy_with_budget(&book.asks, input)?;
                (fill.received_qty, Some(fill.slippage_pct()))
            } else {
                (input / best.price, Some(Decimal::ZERO))
            };
            Ok((raw_output * (Decimal::ONE - FEE_SPOT), slippage))
        }
    }

    fn execute_fiat_leg(&self, fiat: &Currency, to_usd: bool, input: Decimal) -> Result<(Decimal, Option<Decimal>), CoreError> {
        if self.cache.provider_is_critical(ProviderId::Fiat) {
            return Err(CoreError::ProviderUnavailable { provider: ProviderId::Fiat });
        }
        let usd = Currency::new("USD");
        let rate = if to_usd {
            self.cache.get_fiat_rate(fiat, &usd)
        } else {
            self.cache.get_fiat_rate(&usd, fiat)
        }
        .ok_or_else(|| CoreError::UnknownCurrency(fiat.clone()))?;
        Ok((input * rate * (Decimal::ONE - FEE_FIAT_CARD), None))
    }

    async fn execute_bridge_leg(&self, from: &Currency, to: &Currency, input: Decimal) -> Result<(Decimal, Option<Decimal>), CoreError> {
        if !self.bridge_breaker.try_acquire() {
            return Err(CoreError::ProviderUnavailable { provider: ProviderId::Bridge });
        }
        let bridge = Arc::clone(&self.bridge);
        let from = from.clone();
        let to = to.clone();
        let outcome = retry_with_backoff(RetryPolicy::SCHEDULER, || false, |_attempt| {
            let bridge = Arc::clone(&bridge);
            let from = from.as_str().to_string();
            let to = to.as_str().to_string();
            async move { bridge.fetch_quote(&from, &to, input).await }
        })
        .await;

        match outcome {
            Ok(quote) => {
                self.bridge_breaker.record_success();
                self.cache.record_bridge_success();
                Ok((quote.output_amount, None))
            }
            Err(err) => {
                self.bridge_breaker.record_failure();
                Err(err.into())
            }
        }
    }
}

fn required_providers(legs: &[LegSpec]) -> Vec<ProviderId> {
    let mut providers = Vec::new();
    for leg in legs {
        let provider = match leg {
            LegSpec::Spot { .. } => Some(ProviderId::Spot),
            LegSpec::Fiat { .. } => Some(ProviderId::Fiat),
            LegSpec::Bridge { .. } => Some(ProviderId::Bridge),
            LegSpec::Card { .. } | LegSpec::Withdraw { .. } => None,
        };
        if let Some(provider) = provider {
            if !providers.contains(&provider) {
                providers.push(provider);
            }
        }
    }
    providers
}

fn plan_route(
    from: &Currency,
    to: &Currency,
    from_class: CurrencyClass,
    to_class: CurrencyClass,
    bridge_fiat: &Currency,
    bridge_crypto: &Currency,
) -> Option<Vec<LegSpec>> {
    use CurrencyClass::*;
    let usdt = Currency::new("USDT");
    let usd = Currency::new("USD");

    let legs = match (from_class, to_class) {
        (BridgeFiat, BridgeCrypto) => vec![
            LegSpec::Bridge { from: from.clone(), to: to.clone() },
            LegSpec::Withdraw { destination: Destination::Spot },
        ],
        (BridgeCrypto, BridgeFiat) => vec![
            LegSpec::Withdraw { destination: Destination::Bridge },
            LegSpec::Bridge { from: from.clone(), to: to.clone() },
        ],

        (BridgeFiat, Crypto) => vec![
            LegSpec::Bridge { from: from.clone(), to: bridge_crypto.clone() },
            LegSpec::Withdraw { destination: Destination::Spot },
            LegSpec::Spot { base: bridge_crypto.clone(), selling_base: true },
            LegSpec::Spot { base: to.clone(), selling_base: false },
        ],
        (BridgeFiat, Fiat) => vec![
            LegSpec::Bridge { from: from.clone(), to: bridge_crypto.clone() },
            LegSpec::Withdraw { destination: Destination::Spot },
            LegSpec::Spot { base: bridge_crypto.clone(), selling_base: true },
            LegSpec::Card { selling_usdt: true },
            LegSpec::Fiat { fiat: to.clone(), to_usd: false },
        ],
        (Crypto, BridgeFiat) => vec![
            LegSpec::Spot { base: from.clone(), selling_base: true },
            LegSpec::Spot { base: bridge_crypto.clone(), selling_base: false },
            LegSpec::Withdraw { destination: Destination::Bridge },
            LegSpec::Bridge { from: bridge_crypto.clone(), to: to.clone() },
        ],
        (Fiat, BridgeFiat) => vec![
            LegSpec::Fiat { fiat: from.clone(), to_usd: true },
            LegSpec::Card { selling_usdt: false },
            LegSpec::Spot { base: bridge_crypto.clone(), selling_base: false },
            LegSpec::Withdraw { destination: Destination::Bridge },
            LegSpec::Bridge { from: bridge_crypto.clone(), to: to.clone() },
        ],

        (Crypto, Crypto) => {
            if from.as_str() == usdt.as_str() {
                vec![LegSpec::Spot { base: to.clone(), selling_base: false }]
            } else if to.as_str() == usdt.as_str() {
                vec![LegSpec::Spot { base: from.clone(), selling_base: true }]
            } else {
                vec![
                    LegSpec::Spot { base: from.clone(), selling_base: true },
                    LegSpec::Spot { base: to.clone(), selling_base: false },
                ]
            }
        }
        (Fiat, Fiat) => {
            if from.as_str() == usd.as_str() {
                vec![LegSpec::Fiat { fiat: to.clone(), to_usd: false }]
            } else if to.as_str() == usd.as_str() {
                vec![LegSpec::Fiat { fiat: from.clone(), to_usd: true }]
            } else {
                vec![
                    LegSpec::Fiat { fiat: from.clone(), to_usd: true },
                    LegSpec::Fiat { fiat: to.clone(), to_usd: false },
                ]
            }
        }

        (BridgeCrypto, Crypto) => {
            if to.as_str() == usdt.as_str() {
                vec![LegSpec::Spot { base: from.clone(), selling_base: true }]
            } else {
                vec![
                    LegSpec::Spot { base: from.clone(), selling_base: true },
                    LegSpec::Spot { base: to.clone(), selling_base: false },
                ]
            }
        }
        (Crypto, BridgeCrypto) => {
            if from.as_str() == usdt.as_str() {
                vec![LegSpec::Spot { base: to.clone(), selling_base: false }]
            } else {
                vec![
                    LegSpec::Spot { base: from.clone(), selling_base: true },
                    LegSpec::Spot { base: to.clone(), selling_base: false },
                ]
            }
        }

        (BridgeCrypto, Fiat) => vec![
            LegSpec::Spot { base: from.clone(), selling_base: true },
            LegSpec::Card { selling_usdt: true },
            LegSpec::Fiat { fiat: to.clone(), to_usd: false },
        ],
        (Fiat, BridgeCrypto) => vec![
            LegSpec::Fiat { fiat: from.clone(), to_usd: true },
            LegSpec::Card { selling_usdt: false },
            LegSpec::Spot { base: to.clone(), selling_base: false },
        ],

        _ => return None,
    };
    Some(legs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use xchange_data::provider::BridgeQuote;
    use xchange_data::{Level, SpotBook};
    use xchange_instrument::CurrencyTable;
    use xchange_integration::SocketError;

    struct FixedBridge;
    #[async_trait]
    impl BridgeProvider for FixedBridge {
        async fn fetch_quote(&self, _from: &str, _to: &str, input: Decimal) -> Result<BridgeQuote, SocketError> {
            Ok(BridgeQuote { output_amount: input / dec!(90), min: None, max: None })
        }
    }

    fn cache_with_books() -> Arc<RateCache> {
        let cache = Arc::new(RateCache::new(CurrencyTable::new(Currency::new("RUB"), Currency::new("TON"))));
        let ton_book = SpotBook::from_raw(
            "TONUSDT",
            vec![Level::new(dec!(4.9), dec!(10000))],
            vec![Level::new(dec!(5.0), dec!(10000))],
            Utc::now(),
            None,
        )
        .unwrap();
        let btc_book = SpotBook::from_raw(
            "BTCUSDT",
            vec![Level::new(dec!(60000), dec!(10))],
            vec![Level::new(dec!(60010), dec!(10))],
            Utc::now(),
            None,
        )
        .unwrap();
        cache.publish_spot_batch(vec![ton_book, btc_book]);
        let mut rates = std::collections::HashMap::new();
        rates.insert(Currency::new("EUR"), dec!(0.9));
        cache.publish_fiat_batch(rates);
        cache
    }

    fn router() -> Router {
        Router::new(cache_with_books(), Arc::new(FixedBridge))
    }

    #[tokio::test]
    async fn identity_conversion_returns_input_unchanged() {
        let router = router();
        let ton = Currency::new("TON");
        let result = router.convert(&ton, &ton, dec!(10)).await.unwrap();
        assert_eq!(result.final_amount, dec!(10));
        assert!(result.legs.is_empty());
    }

    #[tokio::test]
    async fn crypto_to_crypto_via_usdt_compounds_spot_fee_twice() {
        let router = router();
        let ton = Currency::new("TON");
        let btc = Currency::new("BTC");
        let result = router.convert(&ton, &btc, dec!(1000)).await.unwrap();
        assert_eq!(result.legs.len(), 2);
        // 1000 TON -> USDT at 4.9 * 0.999, then USDT -> BTC at /60010 * 0.999.
        let expected_usdt = dec!(1000) * dec!(4.9) * (Decimal::ONE - FEE_SPOT);
        let expected_btc = (expected_usdt / dec!(60010)) * (Decimal::ONE - FEE_SPOT);
        assert_eq!(result.final_amount, expected_btc);
    }

    #[tokio::test]
    async fn bridge_fiat_to_bridge_crypto_withdraws_after_bridge_quote() {
        let router = router();
        let rub = Currency::new("RUB");
        let ton = Currency::new("TON");
        let result = router.convert(&rub, &ton, dec!(9000)).await.unwrap();
        assert_eq!(result.legs.len(), 2);
        assert_eq!(result.final_amount, dec!(9000) / dec!(90) - WITHDRAWAL_TO_SPOT);
    }

    #[tokio::test]
    async fn bridge_fiat_to_crypto_chains_through_withdrawal_and_spot() {
        let router = router();
        let rub = Currency::new("RUB");
        let btc = Currency::new("BTC");
        let result = router.convert(&rub, &btc, dec!(90000)).await.unwrap();
        assert_eq!(result.legs.len(), 4);
        assert!(result.final_amount > Decimal::ZERO);
    }

    #[tokio::test]
    async fn fiat_to_fiat_via_usd() {
        let router = router();
        let usd = Currency::new("USD");
        let eur = Currency::new("EUR");
        let result = router.convert(&usd, &eur, dec!(100)).await.unwrap();
        assert_eq!(result.legs.len(), 1);
        assert_eq!(result.final_amount, dec!(100) * dec!(0.9) * (Decimal::ONE - FEE_FIAT_CARD));
    }

    #[tokio::test]
    async fn unknown_currency_is_rejected() {
        let router = router();
        let zzz = Currency::new("ZZZ");
        let ton = Currency::new("TON");
        let err = router.convert(&zzz, &ton, dec!(1)).await.unwrap_err();
        assert!(matches!(err, CoreError::UnknownCurrency(_)));
    }

    #[tokio::test]
    async fn negative_amount_is_rejected() {
        let router = router();
        let ton = Currency::new("TON");
        let btc = Currency::new("BTC");
        let err = router.convert(&ton, &btc, dec!(-5)).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn repeated_query_hits_result_cache() {
        let router = router();
        let ton = Currency::new("TON");
        let btc = Currency::new("BTC");
        let first = router.convert(&ton, &btc, dec!(1000)).await.unwrap();
        let second = router.convert(&ton, &btc, dec!(1000)).await.unwrap();
        assert_eq!(first.final_amount, second.final_amount);
    }
}
