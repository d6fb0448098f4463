//! Error taxonomy for the price-cache service.
//!
//! A single `thiserror`-derived enum with helpers for classifying
//! retryability, rather than `String` errors threaded through every
//! `Result`.

use std::time::Duration;
use thiserror::Error;

use crate::value::{PriceKey, Upstream};

/// Errors produced while resolving a single key's value.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// Missing credential, or a key with no registered adapter.
    #[error("configuration error for {key}: {message}")]
    Configuration { key: PriceKey, message: String },

    /// The Rate Limiter refused admission for this upstream.
    #[error("{upstream} quota exhausted")]
    QuotaDenied { upstream: Upstream },

    /// Transport failure, non-2xx status, or malformed payload. Retriable
    /// under exponential backoff.
    #[error("upstream transient error from {upstream}: {message}")]
    UpstreamTransient { upstream: Upstream, message: String },

    /// All retries consumed with no value to show for it.
    #[error("retries exhausted for {key}")]
    Exhausted { key: PriceKey },
}

impl FetchError {
    /// Whether this error is worth retrying under backoff. Configuration
    /// and quota errors are not: retrying them immediately just repeats
    /// the same failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::UpstreamTransient { .. })
    }

    pub fn key_detail(&self, key: PriceKey) -> String {
        format!("{key}: {self}")
    }
}

/// Errors that can abort an HTTP handler outright (as opposed to being
/// absorbed into a per-key error in the response body).
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Advisory delay surfaced in the 503 body's `retryAfter` field.
    pub fn retry_after(&self) -> Duration {
        Duration::from_secs(5)
    }
}

pub type FetchResult<T> = Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_upstream_transient_is_retryable() {
        assert!(FetchError::UpstreamTransient {
            upstream: Upstream::Crypto,
            message: "timeout".into()
        }
        .is_retryable());
        assert!(!FetchError::QuotaDenied {
            upstream: Upstream::MarketData
        }
        .is_retryable());
        assert!(!FetchError::Configuration {
            key: PriceKey::Btc,
            message: "missing credential".into()
        }
        .is_retryable());
    }
}
