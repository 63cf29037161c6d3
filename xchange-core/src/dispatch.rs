use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use xchange_instrument::Currency;

use crate::answer::{format_conversion, format_inverse, Answer, AnswerRank};
use crate::error::CoreError;
use crate::inverse::{solve_for_input, RouteShape};
use crate::parser::{parse_query, CurrencyTables};
use crate::router::Router;

/// A deadline guard checked at the checkpoints between legs (spec §4.14,
/// §5 "cancellation semantics"). Not a real cancellation signal propagated
/// through upstream HTTP calls — those already carry their own request
/// timeouts — but a cheap way for a long chain of legs or a slow inverse
/// solve to bail out once the caller's overall budget is spent.
#[derive(Debug, Clone, Copy)]
pub struct CancelToken {
    deadline: Instant,
}

impl CancelToken {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { deadline: Instant::now() + timeout }
    }

    pub fn is_cancelled(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn check(&self) -> Result<(), CoreError> {
        if self.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// The quick cross the default-target shape always attempts alongside the
/// BRIDGE_FIAT base conversion (spec §8 scenario 5: "quick USD→EUR").
fn quick_target() -> Currency {
    Currency::new("EUR")
}

/// One answer-module behind the external dispatcher's common interface
/// (spec §4.14). The fan-out/merge loop that calls several of these
/// concurrently against a shared deadline lives in the launcher binary;
/// this trait only defines the shape a module must expose to be held
/// behind it.
#[async_trait]
pub trait AnswerModule: Send + Sync {
    async fn process_query(&self, ctx: &CancelToken, query: &str) -> Vec<Answer>;
}

/// The currency answer-module: parses `query`, routes it through `router`,
/// and formats the resulting answer(s) (spec §4.14's `process_query(ctx,
/// query, cache) -> Vec<Answer>` contract — `router` already wraps the rate
/// cache it needs).
pub struct CurrencyModule {
    pub router: Router,
    pub tables: CurrencyTables,
}

#[async_trait]
impl AnswerModule for CurrencyModule {
    async fn process_query(&self, ctx: &CancelToken, query: &str) -> Vec<Answer> {
        process_query(ctx, query, &self.router, &self.tables).await
    }
}

/// Parse `query`, route it, and format the resulting answer(s). Returns an
/// empty list for an empty or non-matching query, a provider error, or a
/// cancelled deadline — a cancelled query "returns no answer rather than a
/// partial result" (spec §5).
#[tracing::instrument(skip(router, tables))]
pub async fn process_query(ctx: &CancelToken, query: &str, router: &Router, tables: &CurrencyTables) -> Vec<Answer> {
    if ctx.check().is_err() {
        return Vec::new();
    }

    let Some(parsed) = parse_query(query, tables) else {
        tracing::debug!("query did not match any recognized shape");
        return Vec::new();
    };

    match parsed.to {
        Some(to) => specific_answer(ctx, router, &parsed.from, &to, parsed.amount).await.into_iter().collect(),
        None => default_target_answers(ctx, router, &parsed.from, parsed.amount).await,
    }
}

async fn specific_answer(ctx: &CancelToken, router: &Router, from: &Currency, to: &Currency, amount: Decimal) -> Option<Answer> {
    ctx.check().ok()?;
    let result = router.convert(from, to, amount).await.ok()?;
    let from_class = router.classify(from);
    let to_class = router.classify(to);
    Some(format_conversion(&result, from_class, to_class, AnswerRank::Specific, false))
}

/// Shape 6 ("single currency — triggers default targets"): a base
/// conversion into BRIDGE_FIAT, its inverse, and a quick EUR cross (spec §8
/// scenario 5). Any leg whose `from` already equals its target is skipped
/// rather than producing a degenerate identity answer.
async fn default_target_answers(ctx: &CancelToken, router: &Router, from: &Currency, amount: Decimal) -> Vec<Answer> {
    let mut answers = Vec::new();
    let bridge_fiat = router.bridge_fiat();

    if ctx.check().is_err() {
        return answers;
    }

    if *from != bridge_fiat {
        if let Ok(base) = router.convert(from, &bridge_fiat, amount).await {
            let from_class = router.classify(from);
            let to_class = router.classify(&bridge_fiat);
            answers.push(format_conversion(&base, from_class, to_class, AnswerRank::Base, true));

            if ctx.check().is_ok() {
                if let Some(inverse) = inverse_answer(router, from, &bridge_fiat, base.final_amount).await {
                    answers.push(inverse);
                }
            }
        }
    }

    if ctx.check().is_err() {
        return answers;
    }

    let quick = quick_target();
    if *from != quick {
        if let Ok(result) = router.convert(from, &quick, amount).await {
            let from_class = router.classify(from);
            let to_class = router.classify(&quick);
            answers.push(format_conversion(&result, from_class, to_class, AnswerRank::Quick, false));
        }
    }

    answers
}

/// Solve "how much `from` is needed to reach `target_output` of `to`" and
/// format it as an inverse answer (spec §4.9, §4.11). Reuses the router's
/// cached inverse entry when present.
async fn inverse_answer(router: &Router, from: &Currency, to: &Currency, target_output: Decimal) -> Option<Answer> {
    if target_output.is_zero() {
        return None;
    }
    if let Some(cached) = router.cached_inverse(from, to, target_output) {
        return Some(format_inverse(from, to, cached.input_amount, target_output));
    }

    let shape = if router.route_touches_bridge(from, to) { RouteShape::Opaque } else { RouteShape::Monotone };
    let required_input = solve_for_input(target_output, Decimal::ONE, shape, |input| {
        let from = from.clone();
        let to = to.clone();
        async move { router.convert(&from, &to, input).await }
    })
    .await
    .ok()?;

    let result = router.convert(from, to, required_input).await.ok()?;
    router.cache_inverse(from, to, target_output, result);

    Some(format_inverse(from, to, required_input, target_output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use xchange_data::provider::BridgeProvider;
    use xchange_data::{BridgeQuote, Level, RateCache, SpotBook};
    use xchange_instrument::{guard::is_positive, CurrencyTable};
    use xchange_integration::SocketError;

    struct FixedBridge;

    #[async_trait]
    impl BridgeProvider for FixedBridge {
        async fn fetch_quote(&self, _from: &str, _to: &str, amount: Decimal) -> Result<BridgeQuote, SocketError> {
            if !is_positive(amount) {
                return Err(SocketError::MalformedPayload { provider: xchange_instrument::ProviderId::Bridge, reason: "bad amount".into() });
            }
            Ok(BridgeQuote { output_amount: amount * dec!(12), min: None, max: None })
        }
    }

    fn router_with_books() -> Router {
        let cache = Arc::new(RateCache::new(CurrencyTable::new(Currency::new("RUB"), Currency::new("TON"))));
        let ton_book = SpotBook::from_raw(
            "TONUSDT",
            vec![Level::new(dec!(4.9), dec!(10000))],
            vec![Level::new(dec!(5.0), dec!(10000))],
            Utc::now(),
            None,
        )
        .unwrap();
        cache.publish_spot_batch(vec![ton_book]);
        cache.publish_fiat_batch([(Currency::new("EUR"), dec!(0.9))].into_iter().collect());
        Router::new(cache, Arc::new(FixedBridge))
    }

    #[tokio::test]
    async fn empty_query_yields_no_answers() {
        let router = router_with_books();
        let tables = CurrencyTables::new();
        let ctx = CancelToken::with_timeout(Duration::from_secs(5));
        let answers = process_query(&ctx, "", &router, &tables).await;
        assert!(answers.is_empty());
    }

    #[tokio::test]
    async fn already_expired_deadline_yields_no_answers() {
        let router = router_with_books();
        let tables = CurrencyTables::new();
        let ctx = CancelToken::with_timeout(Duration::from_secs(0));
        std::thread::sleep(Duration::from_millis(5));
        let answers = process_query(&ctx, "100 USD to EUR", &router, &tables).await;
        assert!(answers.is_empty());
    }

    #[tokio::test]
    async fn explicit_target_query_yields_one_specific_answer() {
        let router = router_with_books();
        let tables = CurrencyTables::new();
        let ctx = CancelToken::with_timeout(Duration::from_secs(5));
        let answers = process_query(&ctx, "100 USD to EUR", &router, &tables).await;
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].score, AnswerRank::Specific.score());
    }

    #[tokio::test]
    async fn single_currency_query_yields_base_inverse_and_quick_answers() {
        let router = router_with_books();
        let tables = CurrencyTables::new();
        let ctx = CancelToken::with_timeout(Duration::from_secs(5));
        let answers = process_query(&ctx, "100 USD", &router, &tables).await;
        let scores: Vec<u32> = answers.iter().map(|a| a.score).collect();
        assert!(scores.contains(&AnswerRank::Base.score()));
        assert!(scores.contains(&AnswerRank::Quick.score()));
    }
}
