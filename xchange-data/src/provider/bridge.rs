use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use xchange_instrument::ProviderId;
use xchange_integration::SocketError;

use super::{base_url, BridgeProvider, BridgeQuote};

const DEFAULT_BASE_URL: &str = "https://api.bridge-exchange.internal";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
struct CalculationRequest<'a> {
    #[serde(rename = "currencyPair")]
    currency_pair: CurrencyPair<'a>,
    calculation: InputAsset,
}

#[derive(Debug, Serialize)]
struct CurrencyPair<'a> {
    #[serde(rename = "fromCurrency")]
    from_currency: &'a str,
    #[serde(rename = "toCurrency")]
    to_currency: &'a str,
}

#[derive(Debug, Serialize)]
struct InputAsset {
    #[serde(rename = "inputAsset")]
    input_asset: String,
}

#[derive(Debug, Deserialize)]
struct CalculationResponse {
    calculation: OutputAsset,
    limit: Option<Limit>,
    #[serde(rename = "operationStatus")]
    operation_status: OperationStatus,
}

#[derive(Debug, Deserialize)]
struct OutputAsset {
    #[serde(rename = "outputAsset")]
    output_asset: String,
}

#[derive(Debug, Deserialize, Default)]
struct Limit {
    min: Option<String>,
    max: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    enabled: bool,
    #[allow(dead_code)]
    status: Option<String>,
}

/// Per-amount quote fetcher for the Bridge provider (spec §6 "Bridge
/// provider"): posts `(from, to, inputAmount)` and returns the output
/// quantity directly. The caller (the router) computes the effective rate —
/// this client never derives one, matching spec §3 "BridgeQuote is not
/// stored as a rate".
pub struct RestBridgeProvider {
    client: reqwest::Client,
    base_url: String,
}

impl RestBridgeProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("reqwest client builds with static TLS config"),
            base_url: base_url("XCHANGE_BRIDGE_BASE_URL", DEFAULT_BASE_URL),
        }
    }
}

impl Default for RestBridgeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BridgeProvider for RestBridgeProvider {
    async fn fetch_quote(
        &self,
        from: &str,
        to: &str,
        input_amount: Decimal,
    ) -> Result<BridgeQuote, SocketError> {
        let url = format!("{}/exchange/calculation", self.base_url);
        let request = CalculationRequest {
            currency_pair: CurrencyPair {
                from_currency: from,
                to_currency: to,
            },
            calculation: InputAsset {
                input_asset: input_amount.to_string(),
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|source| SocketError::Transport {
                provider: ProviderId::Bridge,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SocketError::HttpStatus {
                provider: ProviderId::Bridge,
                status: status.as_u16(),
            });
        }

        let body: CalculationResponse =
            response.json().await.map_err(|source| SocketError::Transport {
                provider: ProviderId::Bridge,
                source,
            })?;

        if !body.operation_status.enabled {
            return Err(SocketError::MalformedPayload {
                provider: ProviderId::Bridge,
                reason: "operation disabled upstream".into(),
            });
        }

        let output_amount = Decimal::from_str(&body.calculation.output_asset).map_err(|_| {
            SocketError::MalformedPayload {
                provider: ProviderId::Bridge,
                reason: format!("unparseable outputAsset {:?}", body.calculation.output_asset),
            }
        })?;
        if !xchange_instrument::guard::is_positive(output_amount) {
            return Err(SocketError::MalformedPayload {
                provider: ProviderId::Bridge,
                reason: "non-positive outputAsset".into(),
            });
        }

        let limit = body.limit.unwrap_or_default();
        let min = limit.min.and_then(|v| Decimal::from_str(&v).ok());
        let max = limit.max.and_then(|v| Decimal::from_str(&v).ok());
        if let Some(min) = min {
            if input_amount < min {
                return Err(SocketError::MalformedPayload {
                    provider: ProviderId::Bridge,
                    reason: format!("input {input_amount} below plausibility minimum {min}"),
                });
            }
        }
        if let Some(max) = max {
            if input_amount > max {
                return Err(SocketError::MalformedPayload {
                    provider: ProviderId::Bridge,
                    reason: format!("input {input_amount} above plausibility maximum {max}"),
                });
            }
        }

        Ok(BridgeQuote {
            output_amount,
            min,
            max,
        })
    }
}
