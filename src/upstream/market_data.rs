//! Market-data vendor adapter (the `MSTR`/`STRF`/`STRC`/`STRK`/`STRD`
//! keys). One instance per key, all pointed at the same vendor URL and
//! sharing one credential — the Rate Limiter ties them together via
//! `Upstream::MarketData`, not this adapter.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use super::{parse_error, transport_error, PriceAdapter};
use crate::error::{FetchError, FetchResult};
use crate::value::{PriceKey, PriceValue, Upstream};

pub struct MarketDataAdapter {
    key: PriceKey,
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl MarketDataAdapter {
    pub fn new(key: PriceKey, url: String, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            key,
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build market-data HTTP client"),
            url,
            api_key,
        }
    }
}

#[async_trait]
impl PriceAdapter for MarketDataAdapter {
    fn key(&self) -> PriceKey {
        self.key
    }

    fn upstream(&self) -> Upstream {
        Upstream::MarketData
    }

    async fn fetch(&self) -> FetchResult<PriceValue> {
        let api_key = self.api_key.as_ref().ok_or_else(|| FetchError::Configuration {
            key: self.key,
            message: "MARKET_DATA_API_KEY is not set".to_string(),
        })?;

        let response = self
            .client
            .get(&self.url)
            .query(&[("symbol", self.key.wire_name())])
            .header("Accept", "application/json")
            .header("Authorization", format!("Bearer {api_key}"))
            .send()
            .await
            .map_err(|e| transport_error(Upstream::MarketData, e))?;

        // The vendor's own rate-limit status is treated as an upstream
        // transient, not a hard failure: it is retriable under the same
        // backoff as any other transient error.
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::UpstreamTransient {
                upstream: Upstream::MarketData,
                message: "vendor rate limit (429)".to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(super::status_error(Upstream::MarketData, response.status()));
        }

        let body: QuoteResponse = response
            .json()
            .await
            .map_err(|e| parse_error(Upstream::MarketData, e))?;

        Ok(PriceValue::Quote {
            price: body.price,
            high: body.high,
            low: body.low,
            volume: body.volume,
        })
    }
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    price: Decimal,
    #[serde(default)]
    high: Option<Decimal>,
    #[serde(default)]
    low: Option<Decimal>,
    #[serde(default)]
    volume: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_fails_fast_without_credential() {
        let adapter = MarketDataAdapter::new(
            PriceKey::Mstr,
            "http://example.invalid".to_string(),
            None,
            Duration::from_secs(1),
        );
        let err = adapter.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Configuration { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn parses_partial_quote_with_missing_optional_fields() {
        let body = r#"{"price":420.13}"#;
        let parsed: QuoteResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.price, Decimal::new(42013, 2));
        assert!(parsed.high.is_none());
    }
}
