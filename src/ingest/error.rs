// src/ingest/error.rs
use std::time::Duration;

use thiserror::Error;

/// Provider-level failure returned by an adapter call.
///
/// Everything except `MissingCredential` is a runtime fault and counts toward the
/// provider's circuit breaker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("missing credential (set {env_var})")]
    MissingCredential { env_var: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("authentication rejected: {0}")]
    AuthError(String),

    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    pub fn counts_toward_breaker(&self) -> bool {
        !matches!(self, ProviderError::MissingCredential { .. })
    }

    /// Short label used as a metrics/log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::MissingCredential { .. } => "missing_credential",
            ProviderError::RateLimited(_) => "rate_limited",
            ProviderError::AuthError(_) => "auth",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::Malformed(_) => "malformed",
            ProviderError::Unavailable(_) => "unavailable",
        }
    }
}

/// Article-scoped decode failure. The article is dropped; the batch continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("empty after normalization: `{0}`")]
    Empty(&'static str),
}
