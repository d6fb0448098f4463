//! Background refresh ticker.
//!
//! `tokio::spawn` plus a `tokio::time::interval` loop, stoppable via a
//! plain `Arc<AtomicBool>` checked once per tick — shutdown should not
//! leave this task dangling and racing the process exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::fetcher::Fetcher;

pub struct Scheduler {
    stop_flag: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the ticker. If `fetcher.seed_on_startup()` is set, every key
    /// is fetched once before the first tick of the interval. `running`
    /// is flipped true immediately and false once `stop()` is called, for
    /// the benefit of `/api/health`.
    pub fn start(fetcher: Arc<Fetcher>, running: Arc<AtomicBool>) -> Self {
        running.store(true, Ordering::SeqCst);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let task_stop_flag = stop_flag.clone();
        let interval = fetcher.scheduler_interval();

        let handle = tokio::spawn(async move {
            if fetcher.seed_on_startup() {
                tracing::info!("seeding cache on startup");
                let _ = fetcher.fetch_all().await;
            }

            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; consume it

            loop {
                ticker.tick().await;
                if task_stop_flag.load(Ordering::SeqCst) {
                    break;
                }

                if fetcher.cache().entries().is_empty() {
                    tracing::info!("cache empty on tick, seeding via fetch_all");
                    let _ = fetcher.fetch_all().await;
                    continue;
                }

                let stale = fetcher.keys_needing_refresh();
                if stale.is_empty() {
                    continue;
                }
                tracing::debug!(count = stale.len(), "refreshing stale entries");

                let refreshes = stale.into_iter().map(|key| {
                    let fetcher = fetcher.clone();
                    async move {
                        if let Err(err) = fetcher.refresh_key(key).await {
                            tracing::warn!(%key, error = %err, "background refresh failed");
                        }
                    }
                });
                futures::future::join_all(refreshes).await;
            }
        });

        Self {
            stop_flag,
            running,
            handle: Some(handle),
        }
    }

    /// Idempotent: calling this more than once, or after the task has
    /// already exited, is a no-op.
    pub async fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::config::Config;
    use crate::rate_limiter::RateLimiter;

    #[tokio::test(start_paused = true)]
    async fn seeds_on_startup_when_configured() {
        let mut config = Config::default();
        config.seed_on_startup = true;
        config.scheduler_interval = std::time::Duration::from_secs(5);
        config.market_data_api_key = Some("test-key".to_string());

        let cache = Arc::new(Cache::new(config.ttl_min, config.ttl_max));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_window));
        let fetcher = Arc::new(Fetcher::new(cache.clone(), rate_limiter, config));

        let mut scheduler = Scheduler::start(fetcher, Arc::new(AtomicBool::new(false)));
        tokio::task::yield_now().await;
        tokio::time::advance(std::time::Duration::from_millis(10)).await;
        tokio::task::yield_now().await;

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn empty_cache_on_tick_triggers_a_seed_fetch() {
        let mut config = Config::default();
        config.seed_on_startup = false;
        config.scheduler_interval = std::time::Duration::from_secs(5);
        config.market_data_api_key = Some("test-key".to_string());

        let cache = Arc::new(Cache::new(config.ttl_min, config.ttl_max));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_window));
        let fetcher = Arc::new(Fetcher::new(cache.clone(), rate_limiter, config));

        assert!(cache.entries().is_empty());

        let mut scheduler = Scheduler::start(fetcher, Arc::new(AtomicBool::new(false)));
        tokio::time::advance(std::time::Duration::from_secs(5)).await;
        tokio::task::yield_now().await;
        tokio::time::advance(std::time::Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        assert!(!cache.entries().is_empty());

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let config = Config::default();
        let cache = Arc::new(Cache::new(config.ttl_min, config.ttl_max));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_window));
        let fetcher = Arc::new(Fetcher::new(cache, rate_limiter, config));

        let mut scheduler = Scheduler::start(fetcher, Arc::new(AtomicBool::new(false)));
        scheduler.stop().await;
        scheduler.stop().await;
    }
}
