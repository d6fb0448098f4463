//! Price-caching micro-service.
//!
//! Sits between clients and three upstream price oracles (crypto spot, FX
//! rate, market-data vendor), combining a randomised-TTL cache, a
//! preemptive background refresher, a sliding-window quota enforcer per
//! upstream, and exponential-backoff retry with stale-cache fallback.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod rate_limiter;
pub mod scheduler;
pub mod state;
pub mod upstream;
pub mod value;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assemble the full router. Shared between `main` and the HTTP
/// integration tests so the two never drift apart.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([http::Method::GET]);

    Router::new()
        .route("/api/prices/all", get(api::get_prices_all))
        .route("/api/health", get(api::get_health))
        .route("/api/ping", get(api::get_ping))
        .fallback(api::not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
