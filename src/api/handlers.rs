//! HTTP handlers for the three endpoints. Kept deliberately thin: all the
//! decision-making lives in `Fetcher`; handlers only shape the response
//! and pick a status code.

use std::sync::atomic::Ordering;

use axum::extract::{Query, State};
use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Json;

use crate::api::models::{
    ErrorResponse, HealthResponse, Metadata, PingResponse, PricesAllQuery, PricesAllResponse,
    SchedulerStatus,
};
use crate::state::AppState;
use crate::value::Upstream;

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub async fn get_prices_all(
    State(state): State<AppState>,
    Query(params): Query<PricesAllQuery>,
) -> impl IntoResponse {
    if params.force {
        state.fetcher.cache().clear();
    }

    let outcome = tokio::time::timeout(state.fetcher.handler_timeout(), state.fetcher.fetch_all()).await;

    let result = match outcome {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("fetch_all exceeded the handler timeout");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::handler_failure(
                    "request exceeded the handler timeout".to_string(),
                    5,
                )),
            )
                .into_response();
        }
    };

    let data = result
        .data
        .into_iter()
        .map(|(key, value)| (key.wire_name().to_string(), value))
        .collect();
    let ttls = result
        .ttls
        .into_iter()
        .map(|(key, secs)| (key.wire_name().to_string(), secs))
        .collect();

    let status = if result.errors.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };

    let body = PricesAllResponse {
        data,
        metadata: Metadata {
            cached: result.cached,
            partial: result.partial,
            stale: result.stale,
            degraded: result.degraded,
            timestamp: now_rfc3339(),
            ttls,
        },
        errors: result.errors,
        successes: result.successes,
    };

    (status, Json(body)).into_response()
}

pub async fn get_health(State(state): State<AppState>) -> impl IntoResponse {
    let cache = state.fetcher.cache().stats();

    let mut rate_limits = std::collections::HashMap::new();
    rate_limits.insert(
        Upstream::MarketData.as_str().to_string(),
        state
            .fetcher
            .rate_limiter()
            .usage(Upstream::MarketData.as_str(), state.fetcher.market_data_quota()),
    );

    let running = state.scheduler_running.load(Ordering::SeqCst);
    let status = if running { "healthy" } else { "degraded" };

    let body = HealthResponse {
        status: status.to_string(),
        timestamp: now_rfc3339(),
        uptime_secs: state.uptime_secs(),
        cache,
        rate_limits,
        scheduler: SchedulerStatus {
            running,
            interval_secs: state.fetcher.scheduler_interval().as_secs(),
        },
    };

    (StatusCode::OK, Json(body))
}

pub async fn get_ping() -> impl IntoResponse {
    Json(PingResponse {
        status: "ok",
        timestamp: now_rfc3339(),
    })
}

pub async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::not_found(uri.path().to_string())),
    )
}
