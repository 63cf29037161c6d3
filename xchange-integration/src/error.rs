use xchange_instrument::ProviderId;

/// Transport-level errors shared by every provider fetcher. Distinct from
/// `xchange_core::CoreError` (spec §7), which is the user-facing error surfaced
/// once a route has been resolved; this enum only ever leaves a single HTTP call.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("provider {provider} circuit breaker is open, refusing call")]
    BreakerOpen { provider: ProviderId },

    #[error("provider {provider} request timed out")]
    Timeout { provider: ProviderId },

    #[error("provider {provider} returned an error status: {status}")]
    HttpStatus { provider: ProviderId, status: u16 },

    #[error("provider {provider} returned a malformed payload: {reason}")]
    MalformedPayload { provider: ProviderId, reason: String },

    #[error("provider {provider} transport error: {source}")]
    Transport {
        provider: ProviderId,
        #[source]
        source: reqwest::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl SocketError {
    /// `true` for errors that should count as a circuit-breaker failure (spec
    /// §4.1). Cancellation never counts against a provider: the caller gave up,
    /// not the upstream.
    pub fn counts_as_failure(&self) -> bool {
        !matches!(self, SocketError::Cancelled | SocketError::BreakerOpen { .. })
    }
}
