use async_trait::async_trait;
use rand::seq::IndexedRandom;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use xchange_instrument::ProviderId;
use xchange_integration::SocketError;

use super::{base_url, FiatProvider};

const DEFAULT_BASE_URL: &str = "https://api.card-rates.internal/conversion";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);

/// A small pool of realistic browser `User-Agent` strings. The upstream Fiat
/// provider applies bot mitigation to unmarked automated traffic (spec §4.3),
/// so every request randomizes which one it presents.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
];

#[derive(Debug, Deserialize)]
struct ConversionResponse {
    data: ConversionData,
}

#[derive(Debug, Deserialize)]
struct ConversionData {
    #[serde(rename = "conversionRate")]
    conversion_rate: String,
}

/// `USD -> target` cross-rate fetcher for the Fiat provider (spec §6 "Fiat
/// provider"). Each call is independent and carries its own randomized
/// header set; the adaptive concurrency and jitter between calls in a batch
/// are the scheduler's responsibility (spec §4.3, §4.6), not this client's.
pub struct RestFiatProvider {
    client: reqwest::Client,
    base_url: String,
}

impl RestFiatProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .gzip(true)
                .build()
                .expect("reqwest client builds with static TLS config"),
            base_url: base_url("XCHANGE_FIAT_BASE_URL", DEFAULT_BASE_URL),
        }
    }

    fn random_user_agent() -> &'static str {
        USER_AGENTS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(USER_AGENTS[0])
    }
}

impl Default for RestFiatProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FiatProvider for RestFiatProvider {
    async fn fetch_rate(&self, target: &str) -> Result<Decimal, SocketError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("exchange_date", "0000-00-00"),
                ("transaction_currency", "USD"),
                ("cardholder_billing_currency", target),
                ("bank_fee", "0"),
                ("transaction_amount", "10000000"),
            ])
            .header("User-Agent", Self::random_user_agent())
            .header("Accept", "application/json, text/plain, */*")
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|source| SocketError::Transport {
                provider: ProviderId::Fiat,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SocketError::HttpStatus {
                provider: ProviderId::Fiat,
                status: status.as_u16(),
            });
        }

        let body: ConversionResponse =
            response.json().await.map_err(|source| SocketError::Transport {
                provider: ProviderId::Fiat,
                source,
            })?;

        let rate =
            Decimal::from_str(&body.data.conversion_rate).map_err(|_| SocketError::MalformedPayload {
                provider: ProviderId::Fiat,
                reason: format!("unparseable conversionRate {:?}", body.data.conversion_rate),
            })?;

        if !xchange_instrument::guard::is_positive(rate) {
            return Err(SocketError::MalformedPayload {
                provider: ProviderId::Fiat,
                reason: "non-positive conversionRate".into(),
            });
        }

        Ok(rate)
    }
}
