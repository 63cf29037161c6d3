use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use xchange_instrument::ProviderId;
use xchange_integration::SocketError;

use super::{base_url, SpotProvider};
use crate::book::{Level, SpotBook};

const DEFAULT_BASE_URL: &str = "https://api.spot-exchange.internal";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);

#[derive(Debug, Deserialize)]
struct OrderBookResponse {
    #[serde(rename = "retCode")]
    ret_code: i64,
    result: Option<OrderBookResult>,
}

#[derive(Debug, Deserialize)]
struct OrderBookResult {
    /// Asks, best-first.
    a: Vec<(String, String)>,
    /// Bids, best-first.
    b: Vec<(String, String)>,
}

fn parse_levels(raw: Vec<(String, String)>) -> Vec<Level> {
    raw.into_iter()
        .filter_map(|(price, size)| {
            let price = Decimal::from_str(&price).ok()?;
            let size = Decimal::from_str(&size).ok()?;
            Some(Level::new(price, size))
        })
        .collect()
}

/// Order-book order-book fetcher for the Spot provider (spec §6 "Spot
/// provider"), following the `GET market/orderbook?category=spot&symbol=SSS&limit=N`
/// contract.
///
/// Modelled on the `BuildStrategy`/`HttpParser` split used for REST clients in
/// `jackbot-integration/src/protocol/http`, collapsed here into a single fetch
/// method since there is exactly one endpoint shape to support.
pub struct RestSpotProvider {
    client: reqwest::Client,
    base_url: String,
}

impl RestSpotProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("reqwest client builds with static TLS config"),
            base_url: base_url("XCHANGE_SPOT_BASE_URL", DEFAULT_BASE_URL),
        }
    }
}

impl Default for RestSpotProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpotProvider for RestSpotProvider {
    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<SpotBook, SocketError> {
        let url = format!("{}/market/orderbook", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("category", "spot"),
                ("symbol", symbol),
                ("limit", &depth.max(50).to_string()),
            ])
            .send()
            .await
            .map_err(|source| SocketError::Transport {
                provider: ProviderId::Spot,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SocketError::HttpStatus {
                provider: ProviderId::Spot,
                status: status.as_u16(),
            });
        }

        let body: OrderBookResponse =
            response.json().await.map_err(|source| SocketError::Transport {
                provider: ProviderId::Spot,
                source,
            })?;

        if body.ret_code != 0 {
            return Err(SocketError::MalformedPayload {
                provider: ProviderId::Spot,
                reason: format!("retCode={}", body.ret_code),
            });
        }
        let result = body.result.ok_or_else(|| SocketError::MalformedPayload {
            provider: ProviderId::Spot,
            reason: "missing result".into(),
        })?;

        let asks = parse_levels(result.a);
        let bids = parse_levels(result.b);

        SpotBook::from_raw(symbol, bids, asks, Utc::now(), None).ok_or_else(|| {
            SocketError::MalformedPayload {
                provider: ProviderId::Spot,
                reason: "order book empty or crossed after validation".into(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_levels_drops_unparseable_entries() {
        let levels = parse_levels(vec![
            ("5.0".to_string(), "10".to_string()),
            ("not-a-number".to_string(), "10".to_string()),
        ]);
        assert_eq!(levels.len(), 1);
    }
}
