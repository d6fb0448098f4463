//! Composition root.
//!
//! Holds the shared components every handler needs, cloned cheaply via
//! axum's `State` extractor. Construction order matters: Configuration →
//! Cache → Rate Limiter → Price Fetcher → Scheduler.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::time::Instant;

use crate::cache::Cache;
use crate::config::Config;
use crate::fetcher::Fetcher;
use crate::rate_limiter::RateLimiter;

/// Shared across every axum handler via `State<AppState>`. Cheap to
/// clone — every field is an `Arc` or a `Copy` type.
#[derive(Clone)]
pub struct AppState {
    pub fetcher: Arc<Fetcher>,
    /// Flipped by the scheduler on start/stop; surfaced at `/api/health`.
    pub scheduler_running: Arc<AtomicBool>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let cache = Arc::new(Cache::new(config.ttl_min, config.ttl_max));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_window));
        let fetcher = Arc::new(Fetcher::new(cache, rate_limiter, config));

        Self {
            fetcher,
            scheduler_running: Arc::new(AtomicBool::new(false)),
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
