//! FX rate adapter (the `eurUsd` key). Same shape as `crypto.rs`: one
//! client, one DTO, one request.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::{parse_error, status_error, transport_error, PriceAdapter};
use crate::error::FetchResult;
use crate::value::{PriceKey, PriceValue, Upstream};

pub struct FxAdapter {
    client: Client,
    url: String,
}

impl FxAdapter {
    pub fn new(url: String, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build fx feed HTTP client"),
            url,
        }
    }
}

#[async_trait]
impl PriceAdapter for FxAdapter {
    fn key(&self) -> PriceKey {
        PriceKey::EurUsd
    }

    fn upstream(&self) -> Upstream {
        Upstream::Fx
    }

    async fn fetch(&self) -> FetchResult<PriceValue> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| transport_error(Upstream::Fx, e))?;

        if !response.status().is_success() {
            return Err(status_error(Upstream::Fx, response.status()));
        }

        let body: RatesResponse = response
            .json()
            .await
            .map_err(|e| parse_error(Upstream::Fx, e))?;

        let rate = body
            .rates
            .get("USD")
            .copied()
            .ok_or_else(|| parse_error(Upstream::Fx, "response missing USD rate"))?;

        Ok(PriceValue::scalar(rate))
    }
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[serde(default)]
    #[allow(dead_code)]
    base: Option<String>,
    rates: HashMap<String, Decimal>,
}
