//! Crypto spot price adapter (the `btc` key).
//!
//! A `reqwest::Client` with a fixed timeout, one response DTO, one `fetch`
//! method. No client-side rate limiting here — the crypto upstream
//! declares no quota, so the Rate Limiter layer above never gates it.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use super::{parse_error, status_error, transport_error, PriceAdapter};
use crate::error::FetchResult;
use crate::value::{PriceKey, PriceValue, Upstream};

pub struct CryptoAdapter {
    client: Client,
    url: String,
}

impl CryptoAdapter {
    pub fn new(url: String, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build crypto feed HTTP client"),
            url,
        }
    }
}

#[async_trait]
impl PriceAdapter for CryptoAdapter {
    fn key(&self) -> PriceKey {
        PriceKey::Btc
    }

    fn upstream(&self) -> Upstream {
        Upstream::Crypto
    }

    async fn fetch(&self) -> FetchResult<PriceValue> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| transport_error(Upstream::Crypto, e))?;

        if !response.status().is_success() {
            return Err(status_error(Upstream::Crypto, response.status()));
        }

        let body: SpotPriceResponse = response
            .json()
            .await
            .map_err(|e| parse_error(Upstream::Crypto, e))?;

        let amount = Decimal::from_str(&body.data.amount)
            .map_err(|e| parse_error(Upstream::Crypto, e))?;

        Ok(PriceValue::scalar(amount))
    }
}

#[derive(Debug, Deserialize)]
struct SpotPriceResponse {
    data: SpotPriceData,
}

#[derive(Debug, Deserialize)]
struct SpotPriceData {
    amount: String,
    #[serde(default)]
    #[allow(dead_code)]
    currency: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_coinbase_style_spot_envelope() {
        let body = r#"{"data":{"base":"BTC","currency":"USD","amount":"100000.50"}}"#;
        let parsed: SpotPriceResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.amount, "100000.50");
    }
}
