use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use xchange_instrument::{Currency, ProviderId};
use xchange_integration::{retry_with_backoff, CircuitBreaker, RateLimiter, RetryPolicy};

use crate::cache::RateCache;
use crate::persistence::PersistenceWriter;
use crate::provider::{BridgeProvider, FiatProvider, SpotProvider};

/// Beyond this many consecutive failures the scheduler logs a critical
/// warning for that provider (spec §4.6); kept equal to the circuit
/// breaker's own failure threshold since both describe the same "this
/// provider is down" condition.
const MAX_CONSECUTIVE_FAILURES: u32 = 5;
const SPOT_CONCURRENCY: usize = 5;
const FIAT_CONCURRENCY: usize = 3;
const FORCE_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("force refresh timed out after {0:?}")]
    Timeout(Duration),
}

/// Drives the three independent per-provider refresh loops plus a health
/// logger (spec §4.6, C7).
///
/// Grounded on `jackbot_integration::stream`'s long-lived-task-per-feed
/// pattern (workers ticking on their own interval), with the websocket push
/// loop there replaced by a poll-on-a-ticker loop since every provider here
/// is a REST endpoint (see the dropped-dependency note for
/// `tokio-tungstenite`).
pub struct Scheduler {
    cache: Arc<RateCache>,
    persistence: Arc<PersistenceWriter>,
    spot: Arc<dyn SpotProvider>,
    fiat: Arc<dyn FiatProvider>,
    bridge: Arc<dyn BridgeProvider>,
    spot_symbols: Vec<String>,
    fiat_targets: Vec<Currency>,
    spot_breaker: CircuitBreaker,
    fiat_breaker: CircuitBreaker,
    bridge_breaker: CircuitBreaker,
    spot_limiter: RateLimiter,
    fiat_limiter: RateLimiter,
    force_refresh_lock: Mutex<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(
        cache: Arc<RateCache>,
        persistence: Arc<PersistenceWriter>,
        spot: Arc<dyn SpotProvider>,
        fiat: Arc<dyn FiatProvider>,
        bridge: Arc<dyn BridgeProvider>,
        spot_symbols: Vec<String>,
        fiat_targets: Vec<Currency>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            cache,
            persistence,
            spot,
            fiat,
            bridge,
            spot_symbols,
            fiat_targets,
            spot_breaker: CircuitBreaker::new(),
            fiat_breaker: CircuitBreaker::new(),
            bridge_breaker: CircuitBreaker::new(),
            spot_limiter: RateLimiter::per_minute(120, 10),
            fiat_limiter: RateLimiter::per_minute(60, 5),
            force_refresh_lock: Mutex::new(()),
            shutdown_tx,
        }
    }

    fn shutdown_requested(rx: &watch::Receiver<bool>) -> bool {
        *rx.borrow()
    }

    /// Spawn the per-provider loops and the health logger. Callers keep the
    /// returned handles to await graceful shutdown; dropping them does not
    /// stop the tasks (spec §4.6 "Loops terminate on a shutdown signal").
    pub fn spawn(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::with_capacity(4);

        let this = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            this.provider_loop(ProviderId::Spot, |this| {
                let this = Arc::clone(this);
                Box::pin(async move { this.run_spot_tick().await })
            })
            .await;
        }));

        let this = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            this.provider_loop(ProviderId::Fiat, |this| {
                let this = Arc::clone(this);
                Box::pin(async move { this.run_fiat_tick().await })
            })
            .await;
        }));

        let this = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            this.provider_loop(ProviderId::Bridge, |this| {
                let this = Arc::clone(this);
                Box::pin(async move { this.run_bridge_tick().await })
            })
            .await;
        }));

        let this = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            this.health_loop().await;
        }));

        handles
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    #[allow(clippy::type_complexity)]
    async fn provider_loop(
        self: &Arc<Self>,
        provider: ProviderId,
        tick: impl Fn(&Arc<Self>) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send>>,
    ) {
        let mut rx = self.shutdown_tx.subscribe();
        let mut interval = tokio::time::interval(provider.refresh_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = rx.changed() => {
                    if *rx.borrow() {
                        tracing::info!(%provider, "refresh loop shutting down");
                        return;
                    }
                }
            }
            if Self::shutdown_requested(&rx) {
                return;
            }
            let succeeded = tick(self).await;
            let status = self.cache.provider_status(provider);
            if !succeeded && status.consecutive_fails >= MAX_CONSECUTIVE_FAILURES {
                tracing::error!(%provider, fails = status.consecutive_fails, "provider has failed repeatedly");
            }
            if succeeded {
                if let Err(err) = self.persistence.maybe_save(&self.cache).await {
                    tracing::warn!(error = %err, "snapshot save failed");
                }
            }
        }
    }

    async fn health_loop(self: Arc<Self>) {
        let mut rx = self.shutdown_tx.subscribe();
        let mut interval = tokio::time::interval(HEALTH_LOG_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = rx.changed() => {
                    if *rx.borrow() {
                        return;
                    }
                }
            }
            if Self::shutdown_requested(&rx) {
                return;
            }
            tracing::info!(
                spot = ?self.spot_breaker.state(),
                fiat = ?self.fiat_breaker.state(),
                bridge = ?self.bridge_breaker.state(),
                stale = self.cache.is_stale(),
                "provider health"
            );
        }
    }

    async fn run_spot_tick(&self) -> bool {
        if !self.spot_breaker.try_acquire() {
            tracing::warn!(provider = %ProviderId::Spot, "circuit open, skipping tick");
            return false;
        }
        let spot = Arc::clone(&self.spot);
        let limiter = &self.spot_limiter;
        let breaker = &self.spot_breaker;

        let results: Vec<_> = stream::iter(self.spot_symbols.clone())
            .map(|symbol| {
                let spot = Arc::clone(&spot);
                async move {
                    limiter.wait(std::future::pending()).await.ok();
                    retry_with_backoff(RetryPolicy::SCHEDULER, || false, |_attempt| {
                        let spot = Arc::clone(&spot);
                        let symbol = symbol.clone();
                        async move { spot.fetch_order_book(&symbol, 50).await }
                    })
                    .await
                }
            })
            .buffer_unordered(SPOT_CONCURRENCY)
            .collect()
            .await;

        let mut books = Vec::new();
        let mut any_success = false;
        for result in results {
            match result {
                Ok(book) => {
                    any_success = true;
                    books.push(book);
                }
                Err(err) => tracing::warn!(provider = %ProviderId::Spot, error = %err, "fetch failed"),
            }
        }

        if any_success {
            breaker.record_success();
            self.cache.publish_spot_batch(books);
        } else {
            breaker.record_failure();
            self.cache.record_failure(ProviderId::Spot, "all symbols failed this tick");
        }
        any_success
    }

    async fn run_fiat_tick(&self) -> bool {
        if !self.fiat_breaker.try_acquire() {
            tracing::warn!(provider = %ProviderId::Fiat, "circuit open, skipping tick");
            return false;
        }
        let fiat = Arc::clone(&self.fiat);
        let limiter = &self.fiat_limiter;
        let breaker = &self.fiat_breaker;

        let results: Vec<_> = stream::iter(self.fiat_targets.clone())
            .map(|target| {
                let fiat = Arc::clone(&fiat);
                async move {
                    limiter.wait(std::future::pending()).await.ok();
                    let outcome = retry_with_backoff(RetryPolicy::SCHEDULER, || false, |_attempt| {
                        let fiat = Arc::clone(&fiat);
                        let target = target.as_str().to_string();
                        async move { fiat.fetch_rate(&target).await }
                    })
                    .await;
                    (target, outcome)
                }
            })
            .buffer_unordered(FIAT_CONCURRENCY)
            .collect()
            .await;

        let mut rates = HashMap::new();
        let mut any_success = false;
        for (target, outcome) in results {
            match outcome {
                Ok(rate) => {
                    any_success = true;
                    rates.insert(target, rate);
                }
                Err(err) => tracing::warn!(provider = %ProviderId::Fiat, %target, error = %err, "fetch failed"),
            }
        }

        if any_success {
            breaker.record_success();
            self.cache.publish_fiat_batch(rates);
        } else {
            breaker.record_failure();
            self.cache.record_failure(ProviderId::Fiat, "all targets failed this tick");
        }
        any_success
    }

    /// Bridge has no rate map to publish into; the tick exists purely to
    /// exercise the breaker/limiter and refresh the provider's staleness
    /// clock (spec §3 "BridgeQuote is not stored as a rate").
    async fn run_bridge_tick(&self) -> bool {
        if !self.bridge_breaker.try_acquire() {
            tracing::warn!(provider = %ProviderId::Bridge, "circuit open, skipping tick");
            return false;
        }
        let bridge = Arc::clone(&self.bridge);
        let bridge_fiat = self.cache.bridge_fiat();
        let bridge_crypto = self.cache.bridge_crypto();

        let outcome = retry_with_backoff(RetryPolicy::SCHEDULER, || false, |_attempt| {
            let bridge = Arc::clone(&bridge);
            let from = bridge_fiat.as_str().to_string();
            let to = bridge_crypto.as_str().to_string();
            async move { bridge.fetch_quote(&from, &to, rust_decimal::Decimal::ONE_HUNDRED).await }
        })
        .await;

        match outcome {
            Ok(_) => {
                self.bridge_breaker.record_success();
                self.cache.record_bridge_success();
                true
            }
            Err(err) => {
                self.bridge_breaker.record_failure();
                self.cache.record_failure(ProviderId::Bridge, err.to_string());
                tracing::warn!(provider = %ProviderId::Bridge, error = %err, "canary quote failed");
                false
            }
        }
    }

    /// Run all three ticks once, outside the normal ticker cadence. Only one
    /// refresh runs at a time (spec §4.6 "`forceRefresh()` is mutex-protected
    /// (one refresh at a time) with a global timeout").
    pub async fn force_refresh(&self) -> Result<(), SchedulerError> {
        let _guard = self.force_refresh_lock.lock().await;
        let work = async {
            self.run_spot_tick().await;
            self.run_fiat_tick().await;
            self.run_bridge_tick().await;
        };
        tokio::time::timeout(FORCE_REFRESH_TIMEOUT, work)
            .await
            .map_err(|_| SchedulerError::Timeout(FORCE_REFRESH_TIMEOUT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{Level, SpotBook};
    use crate::provider::BridgeQuote;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use xchange_instrument::CurrencyTable;
    use xchange_integration::SocketError;

    struct AlwaysOkSpot;
    #[async_trait]
    impl SpotProvider for AlwaysOkSpot {
        async fn fetch_order_book(&self, symbol: &str, _depth: usize) -> Result<SpotBook, SocketError> {
            Ok(SpotBook::from_raw(
                symbol,
                vec![Level::new(dec!(4.9), dec!(10))],
                vec![Level::new(dec!(5.0), dec!(10))],
                Utc::now(),
                None,
            )
            .unwrap())
        }
    }

    struct AlwaysFailFiat;
    #[async_trait]
    impl FiatProvider for AlwaysFailFiat {
        async fn fetch_rate(&self, _target: &str) -> Result<Decimal, SocketError> {
            Err(SocketError::Timeout { provider: ProviderId::Fiat })
        }
    }

    struct AlwaysOkBridge;
    #[async_trait]
    impl BridgeProvider for AlwaysOkBridge {
        async fn fetch_quote(&self, _from: &str, _to: &str, input: Decimal) -> Result<BridgeQuote, SocketError> {
            Ok(BridgeQuote { output_amount: input / dec!(100), min: None, max: None })
        }
    }

    fn scheduler() -> Scheduler {
        let cache = Arc::new(RateCache::new(CurrencyTable::new(Currency::new("RUB"), Currency::new("TON"))));
        let persistence = Arc::new(PersistenceWriter::new(
            std::env::temp_dir().join(format!("xchange-sched-test-{}.json", std::process::id())),
        ));
        Scheduler::new(
            cache,
            persistence,
            Arc::new(AlwaysOkSpot),
            Arc::new(AlwaysFailFiat),
            Arc::new(AlwaysOkBridge),
            vec!["TONUSDT".to_string()],
            vec![Currency::new("EUR")],
        )
    }

    #[tokio::test]
    async fn successful_spot_tick_publishes_and_closes_breaker() {
        let sched = scheduler();
        assert!(sched.run_spot_tick().await);
        assert!(sched.cache.get_spot("TONUSDT").is_some());
    }

    #[tokio::test]
    async fn failing_fiat_tick_records_failure() {
        let sched = scheduler();
        assert!(!sched.run_fiat_tick().await);
        let status = sched.cache.provider_status(ProviderId::Fiat);
        assert_eq!(status.consecutive_fails, 1);
    }

    #[tokio::test]
    async fn force_refresh_runs_all_three_providers() {
        let sched = scheduler();
        sched.force_refresh().await.unwrap();
        assert!(sched.cache.get_spot("TONUSDT").is_some());
        assert!(sched.cache.provider_last_update(ProviderId::Bridge).is_some());
    }
}
