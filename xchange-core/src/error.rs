use rust_decimal::Decimal;
use xchange_instrument::{Currency, ProviderId};

/// Errors the conversion core can surface to a caller (spec §7, §4.13).
///
/// Every variant maps to a user-facing condition rather than an internal
/// implementation detail: a client never needs to know whether a leg failed
/// because of a breaker, a timeout, or a malformed payload — only that the
/// provider behind it is unavailable.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum CoreError {
    #[error("amount must be a finite, positive number: {0}")]
    InvalidAmount(String),
    #[error("unknown currency: {0}")]
    UnknownCurrency(Currency),
    #[error("no route between {from} and {to}")]
    NoRoute { from: Currency, to: Currency },
    #[error("provider {provider} is unavailable")]
    ProviderUnavailable { provider: ProviderId },
    #[error("rates are outdated for this conversion")]
    RatesOutdated,
    #[error("amount too large for market")]
    AmountTooLarge,
    #[error("amount too small after fees: remainder {remainder} <= 0")]
    AmountTooSmall { remainder: Decimal },
    #[error("query was cancelled before completion")]
    Cancelled,
    #[error("no answer for this query")]
    NoAnswer,
}

impl From<xchange_data::engine::EngineError> for CoreError {
    fn from(value: xchange_data::engine::EngineError) -> Self {
        match value {
            xchange_data::engine::EngineError::InsufficientLiquidity { .. } => CoreError::AmountTooLarge,
            xchange_data::engine::EngineError::EmptyBook => CoreError::AmountTooLarge,
            xchange_data::engine::EngineError::BudgetTooSmall => {
                CoreError::AmountTooSmall { remainder: Decimal::ZERO }
            }
        }
    }
}

impl From<xchange_integration::SocketError> for CoreError {
    fn from(value: xchange_integration::SocketError) -> Self {
        let provider = match &value {
            xchange_integration::SocketError::BreakerOpen { provider }
            | xchange_integration::SocketError::Timeout { provider }
            | xchange_integration::SocketError::HttpStatus { provider, .. }
            | xchange_integration::SocketError::MalformedPayload { provider, .. }
            | xchange_integration::SocketError::Transport { provider, .. } => *provider,
            xchange_integration::SocketError::Cancelled => return CoreError::Cancelled,
        };
        CoreError::ProviderUnavailable { provider }
    }
}
