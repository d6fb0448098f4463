//! Wire response models for the HTTP surface. Field names and nesting
//! here are load-bearing — they are consumed directly by clients of
//! `/api/prices/all`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::rate_limiter::Usage;
use crate::value::PriceValue;

#[derive(Debug, Serialize)]
pub struct PricesAllResponse {
    pub data: HashMap<String, PriceValue>,
    pub metadata: Metadata,
    pub errors: Vec<String>,
    pub successes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Metadata {
    /// True iff the warm-cache fast path served this request.
    pub cached: bool,
    /// True iff any key produced an error (stale fallback or substituted
    /// default both count).
    pub partial: bool,
    /// True iff any value in `data` came from a stale cache entry.
    pub stale: bool,
    /// True iff more than three keys degraded.
    pub degraded: bool,
    pub timestamp: String,
    pub ttls: HashMap<String, u64>,
}

#[derive(Debug, Deserialize)]
pub struct PricesAllQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    #[serde(rename = "uptimeSecs")]
    pub uptime_secs: u64,
    pub cache: CacheStats,
    #[serde(rename = "rateLimits")]
    pub rate_limits: HashMap<String, Usage>,
    pub scheduler: SchedulerStatus,
}

#[derive(Debug, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    #[serde(rename = "intervalSecs")]
    pub interval_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub timestamp: String,
}

/// 503 handler-level failure, or 404 fallback body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "retryAfter")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorResponse {
    pub fn not_found(path: String) -> Self {
        Self {
            error: "Not found".to_string(),
            message: None,
            retry_after: None,
            path: Some(path),
        }
    }

    pub fn handler_failure(message: String, retry_after_secs: u64) -> Self {
        Self {
            error: "internal error".to_string(),
            message: Some(message),
            retry_after: Some(retry_after_secs),
            path: None,
        }
    }
}
