//! Per-key upstream adapters.
//!
//! Each adapter is pure configuration plus a parser: a `reqwest::Client`
//! with a fixed timeout and one `async fn fetch` that issues a single HTTP
//! request and returns a typed value. Retry, backoff, quota-checking, and
//! cache writes all live one layer up in `fetcher.rs` — an adapter never
//! retries itself.

pub mod crypto;
pub mod fx;
pub mod market_data;

use async_trait::async_trait;

use crate::error::{FetchError, FetchResult};
use crate::value::{PriceKey, PriceValue, Upstream};

/// A single upstream HTTP call for one key.
#[async_trait]
pub trait PriceAdapter: Send + Sync {
    fn key(&self) -> PriceKey;
    fn upstream(&self) -> Upstream;

    /// Issue one upstream request and parse the response. Transport
    /// failures, non-2xx statuses, and malformed payloads are all
    /// surfaced as `FetchError::UpstreamTransient` so the retry layer
    /// treats them uniformly.
    async fn fetch(&self) -> FetchResult<PriceValue>;
}

/// Construct the full set of adapters for the reference key set, wiring
/// each to its configured upstream URL and (for market-data) credential.
pub fn build_adapters(config: &crate::config::Config) -> Vec<Box<dyn PriceAdapter>> {
    let timeout = config.upstream_timeout;
    vec![
        Box::new(crypto::CryptoAdapter::new(config.crypto_feed_url.clone(), timeout)),
        Box::new(fx::FxAdapter::new(config.fx_feed_url.clone(), timeout)),
        Box::new(market_data::MarketDataAdapter::new(
            PriceKey::Mstr,
            config.market_data_url.clone(),
            config.market_data_api_key.clone(),
            timeout,
        )),
        Box::new(market_data::MarketDataAdapter::new(
            PriceKey::Strf,
            config.market_data_url.clone(),
            config.market_data_api_key.clone(),
            timeout,
        )),
        Box::new(market_data::MarketDataAdapter::new(
            PriceKey::Strc,
            config.market_data_url.clone(),
            config.market_data_api_key.clone(),
            timeout,
        )),
        Box::new(market_data::MarketDataAdapter::new(
            PriceKey::Strk,
            config.market_data_url.clone(),
            config.market_data_api_key.clone(),
            timeout,
        )),
        Box::new(market_data::MarketDataAdapter::new(
            PriceKey::Strd,
            config.market_data_url.clone(),
            config.market_data_api_key.clone(),
            timeout,
        )),
    ]
}

/// Treat a non-2xx response as an upstream-transient error, including
/// the upstream's own rate-limit status — retriable transient rather
/// than a hard failure.
pub(crate) fn status_error(upstream: Upstream, status: reqwest::StatusCode) -> FetchError {
    FetchError::UpstreamTransient {
        upstream,
        message: format!("upstream returned {status}"),
    }
}

pub(crate) fn transport_error(upstream: Upstream, err: reqwest::Error) -> FetchError {
    FetchError::UpstreamTransient {
        upstream,
        message: format!("request failed: {err}"),
    }
}

pub(crate) fn parse_error(upstream: Upstream, err: impl std::fmt::Display) -> FetchError {
    FetchError::UpstreamTransient {
        upstream,
        message: format!("malformed payload: {err}"),
    }
}
