//! Price Fetcher: materialises a fresh value for a key, honouring quota
//! and retry policy, and writing through to the Cache.
//!
//! `fetch_and_cache` implements the per-key operation: quota check →
//! charge at dispatch → exponential-backoff retry → write-through on
//! success → stale-or-nothing on exhaustion.
//! `fetch_all` implements the batch operation: warm-cache fast path,
//! parallel head for the no-quota keys, sequential tail for the
//! quota-bearing ones, fallback substitution for anything still missing.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::cache::Cache;
use crate::config::Config;
use crate::error::FetchError;
use crate::rate_limiter::RateLimiter;
use crate::upstream::{build_adapters, PriceAdapter};
use crate::value::{PriceKey, PriceValue, Upstream, ALL_KEYS, MARKET_DATA_KEYS, NO_QUOTA_KEYS};

/// Outcome of a single `fetch_and_cache(key)` call.
enum KeyOutcome {
    /// Fresh value from upstream, already written through to the cache.
    Success(PriceValue),
    /// Retries exhausted, but a stale cache entry was available.
    Stale { value: PriceValue, error: FetchError },
    /// No value could be produced at all (configuration error, quota
    /// denial, or exhausted retries with nothing cached).
    Failed(FetchError),
}

/// Aggregate result of `fetch_all`, serialised directly into the
/// `/api/prices/all` response body.
pub struct FetchAllResult {
    pub data: HashMap<PriceKey, PriceValue>,
    pub errors: Vec<String>,
    pub successes: Vec<String>,
    pub cached: bool,
    pub partial: bool,
    pub stale: bool,
    pub degraded: bool,
    pub ttls: HashMap<PriceKey, u64>,
}

pub struct Fetcher {
    cache: std::sync::Arc<Cache>,
    rate_limiter: std::sync::Arc<RateLimiter>,
    adapters: HashMap<PriceKey, Box<dyn PriceAdapter>>,
    config: Config,
}

impl Fetcher {
    pub fn new(cache: std::sync::Arc<Cache>, rate_limiter: std::sync::Arc<RateLimiter>, config: Config) -> Self {
        let adapters = build_adapters(&config)
            .into_iter()
            .map(|a| (a.key(), a))
            .collect();
        Self {
            cache,
            rate_limiter,
            adapters,
            config,
        }
    }

    fn quota_for(&self, upstream: Upstream) -> Option<u32> {
        match upstream {
            Upstream::MarketData => Some(self.config.market_data_quota),
            Upstream::Crypto | Upstream::Fx => None,
        }
    }

    fn fallback_for(&self, key: PriceKey) -> PriceValue {
        match key {
            PriceKey::Btc => PriceValue::scalar(self.config.fallback_btc),
            PriceKey::EurUsd => PriceValue::scalar(self.config.fallback_eur_usd),
            _ => PriceValue::quote(self.config.fallback_quote_price),
        }
    }

    /// Materialise a fresh value for `key`.
    async fn fetch_and_cache(&self, key: PriceKey) -> KeyOutcome {
        let Some(adapter) = self.adapters.get(&key) else {
            return KeyOutcome::Failed(FetchError::Configuration {
                key,
                message: "no adapter registered for this key".to_string(),
            });
        };

        let upstream = key.upstream();

        if let Some(limit) = self.quota_for(upstream) {
            if !self.rate_limiter.can_make_request(upstream.as_str(), limit) {
                tracing::warn!(%key, %upstream, "rate limit denied request");
                return KeyOutcome::Failed(FetchError::QuotaDenied { upstream });
            }
            // Charge at dispatch of the outer call, not per attempt —
            // this caps upstream pressure even under permanent failure.
            self.rate_limiter.record_request(upstream.as_str());
        }

        let mut last_error = None;
        for attempt in 0..self.config.max_retries {
            match adapter.fetch().await {
                Ok(value) => {
                    self.cache.set(key, value.clone());
                    return KeyOutcome::Success(value);
                }
                Err(err) => {
                    tracing::debug!(%key, attempt, error = %err, "fetch attempt failed");
                    let retryable = err.is_retryable();
                    last_error = Some(err);
                    if !retryable {
                        break;
                    }
                    if attempt + 1 < self.config.max_retries {
                        let delay = self.config.base_delay * 2u32.pow(attempt);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        let error = last_error.unwrap_or(FetchError::Exhausted { key });
        match self.cache.get_raw(key) {
            Some(stale_value) => {
                tracing::warn!(%key, %error, "serving stale cache entry after exhausted retries");
                KeyOutcome::Stale {
                    value: stale_value,
                    error,
                }
            }
            None => {
                tracing::error!(%key, %error, "no value available for key");
                KeyOutcome::Failed(error)
            }
        }
    }

    fn apply_outcome(
        &self,
        key: PriceKey,
        outcome: KeyOutcome,
        data: &mut HashMap<PriceKey, PriceValue>,
        errors: &mut Vec<String>,
        successes: &mut Vec<String>,
        stale: &mut bool,
    ) {
        match outcome {
            KeyOutcome::Success(value) => {
                data.insert(key, value);
                successes.push(key.to_string());
            }
            KeyOutcome::Stale { value, error } => {
                data.insert(key, value);
                errors.push(error.key_detail(key));
                *stale = true;
            }
            KeyOutcome::Failed(error) => {
                errors.push(error.key_detail(key));
            }
        }
    }

    /// Batch operation across every known key.
    pub async fn fetch_all(&self) -> FetchAllResult {
        // 1. Warm-cache fast path: linearisable w.r.t. cache writes —
        // either every key is fresh right now, or we fall through.
        if ALL_KEYS.iter().all(|&k| self.cache.has(k)) {
            let mut data = HashMap::new();
            let mut successes = Vec::new();
            let mut ttls = HashMap::new();
            for &key in &ALL_KEYS {
                if let Some(value) = self.cache.get(key) {
                    data.insert(key, value);
                    successes.push(key.to_string());
                }
                ttls.insert(key, self.cache.remaining_ttl(key).as_secs());
            }
            return FetchAllResult {
                data,
                errors: Vec::new(),
                successes,
                cached: true,
                partial: false,
                stale: false,
                degraded: false,
                ttls,
            };
        }

        let mut data = HashMap::new();
        let mut errors = Vec::new();
        let mut successes = Vec::new();
        let mut stale = false;

        // 2. Parallel head: the two no-quota keys, fetched concurrently.
        let head_futures = NO_QUOTA_KEYS.iter().map(|&key| self.fetch_and_cache(key));
        let head_results = futures::future::join_all(head_futures).await;
        for (&key, outcome) in NO_QUOTA_KEYS.iter().zip(head_results) {
            self.apply_outcome(key, outcome, &mut data, &mut errors, &mut successes, &mut stale);
        }

        // 3. Sequential tail: the quota-bearing market-data keys, in a
        // fixed deterministic order.
        let quota = self.config.market_data_quota;
        let tail_len = MARKET_DATA_KEYS.len();
        for (index, &key) in MARKET_DATA_KEYS.iter().enumerate() {
            if self.cache.has(key) {
                if let Some(value) = self.cache.get(key) {
                    data.insert(key, value);
                    successes.push(key.to_string());
                }
            } else {
                let outcome = self.fetch_and_cache(key).await;
                self.apply_outcome(key, outcome, &mut data, &mut errors, &mut successes, &mut stale);
            }

            let remaining_in_tail = tail_len - (index + 1);
            if remaining_in_tail > 0 {
                let usage = self.rate_limiter.usage(Upstream::MarketData.as_str(), quota);
                if usage.remaining <= 1 {
                    let pause = self.config.rate_limit_window / 5;
                    tracing::debug!(?pause, "pausing to let the quota window slide");
                    tokio::time::sleep(pause).await;
                }
            }
        }

        // 5. Fallback substitution for anything still missing.
        let present: HashSet<PriceKey> = data.keys().copied().collect();
        for &key in &ALL_KEYS {
            if !present.contains(&key) {
                let fallback = self.fallback_for(key);
                tracing::warn!(%key, ?fallback, "substituting declared fallback value");
                data.insert(key, fallback);
                errors.push(format!("{key}: no value available, substituted fallback"));
            }
        }

        let degraded = errors.len() > 3;
        let ttls = ALL_KEYS
            .iter()
            .map(|&key| (key, self.cache.remaining_ttl(key).as_secs()))
            .collect();

        FetchAllResult {
            data,
            partial: !errors.is_empty(),
            errors,
            successes,
            cached: false,
            stale,
            degraded,
            ttls,
        }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn market_data_quota(&self) -> u32 {
        self.config.market_data_quota
    }

    /// Keys the scheduler should refresh: every cache entry whose
    /// remaining TTL has fallen below the refresh threshold.
    pub fn keys_needing_refresh(&self) -> Vec<PriceKey> {
        let threshold = self.config.refresh_threshold;
        self.cache
            .entries()
            .into_iter()
            .filter(|(_, remaining)| *remaining < threshold)
            .map(|(key, _)| key)
            .collect()
    }

    pub async fn refresh_key(&self, key: PriceKey) -> Result<(), FetchError> {
        match self.fetch_and_cache(key).await {
            KeyOutcome::Success(_) => Ok(()),
            KeyOutcome::Stale { error, .. } => Err(error),
            KeyOutcome::Failed(error) => Err(error),
        }
    }

    pub fn refresh_threshold(&self) -> Duration {
        self.config.refresh_threshold
    }

    pub fn scheduler_interval(&self) -> Duration {
        self.config.scheduler_interval
    }

    pub fn handler_timeout(&self) -> Duration {
        self.config.handler_timeout
    }

    pub fn seed_on_startup(&self) -> bool {
        self.config.seed_on_startup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::PriceAdapter;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// A scripted adapter for deterministic fetcher tests: returns a
    /// fixed sequence of results, one per call, repeating the last one
    /// once exhausted.
    struct ScriptedAdapter {
        key: PriceKey,
        upstream: Upstream,
        script: Vec<FetchResultScript>,
        calls: AtomicU32,
    }

    enum FetchResultScript {
        Ok(PriceValue),
        Transient,
    }

    #[async_trait]
    impl PriceAdapter for ScriptedAdapter {
        fn key(&self) -> PriceKey {
            self.key
        }
        fn upstream(&self) -> Upstream {
            self.upstream
        }
        async fn fetch(&self) -> Result<PriceValue, FetchError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.script.get(i).or_else(|| self.script.last()) {
                Some(FetchResultScript::Ok(v)) => Ok(v.clone()),
                Some(FetchResultScript::Transient) | None => Err(FetchError::UpstreamTransient {
                    upstream: self.upstream,
                    message: "scripted failure".to_string(),
                }),
            }
        }
    }

    fn fetcher_with(adapter: ScriptedAdapter, config: Config) -> Fetcher {
        let cache = Arc::new(Cache::new(config.ttl_min, config.ttl_max));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_window));
        let mut f = Fetcher::new(cache, rate_limiter, config);
        f.adapters.insert(adapter.key(), Box::new(adapter));
        f
    }

    #[tokio::test]
    async fn success_writes_through_to_cache() {
        let adapter = ScriptedAdapter {
            key: PriceKey::Btc,
            upstream: Upstream::Crypto,
            script: vec![FetchResultScript::Ok(PriceValue::scalar(dec!(100000)))],
            calls: AtomicU32::new(0),
        };
        let f = fetcher_with(adapter, Config::default());
        let outcome = f.fetch_and_cache(PriceKey::Btc).await;
        assert!(matches!(outcome, KeyOutcome::Success(_)));
        assert_eq!(f.cache().get(PriceKey::Btc), Some(PriceValue::scalar(dec!(100000))));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fall_back_to_stale_cache() {
        let mut config = Config::default();
        config.max_retries = 2;
        config.base_delay = Duration::from_millis(10);

        let cache = Arc::new(Cache::new(config.ttl_min, config.ttl_max));
        cache.set(PriceKey::Btc, PriceValue::scalar(dec!(95000)));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_window));
        let mut f = Fetcher::new(cache, rate_limiter, config);
        f.adapters.insert(
            PriceKey::Btc,
            Box::new(ScriptedAdapter {
                key: PriceKey::Btc,
                upstream: Upstream::Crypto,
                script: vec![FetchResultScript::Transient, FetchResultScript::Transient],
                calls: AtomicU32::new(0),
            }),
        );

        let outcome = f.fetch_and_cache(PriceKey::Btc).await;
        match outcome {
            KeyOutcome::Stale { value, .. } => assert_eq!(value, PriceValue::scalar(dec!(95000))),
            _ => panic!("expected stale fallback"),
        }
    }

    #[tokio::test]
    async fn exhausted_without_stale_value_fails_outright() {
        let mut config = Config::default();
        config.max_retries = 1;
        let adapter = ScriptedAdapter {
            key: PriceKey::Btc,
            upstream: Upstream::Crypto,
            script: vec![FetchResultScript::Transient],
            calls: AtomicU32::new(0),
        };
        let f = fetcher_with(adapter, config);
        let outcome = f.fetch_and_cache(PriceKey::Btc).await;
        assert!(matches!(outcome, KeyOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn quota_denial_skips_the_upstream_call_entirely() {
        let mut config = Config::default();
        config.market_data_quota = 1;
        let adapter = ScriptedAdapter {
            key: PriceKey::Mstr,
            upstream: Upstream::MarketData,
            script: vec![FetchResultScript::Ok(PriceValue::quote(dec!(420)))],
            calls: AtomicU32::new(0),
        };
        let cache = Arc::new(Cache::new(config.ttl_min, config.ttl_max));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_window));
        rate_limiter.record_request(Upstream::MarketData.as_str());
        let mut f = Fetcher::new(cache, rate_limiter, config);
        f.adapters.insert(PriceKey::Mstr, Box::new(adapter));

        let outcome = f.fetch_and_cache(PriceKey::Mstr).await;
        assert!(matches!(outcome, KeyOutcome::Failed(FetchError::QuotaDenied { .. })));
    }

    #[tokio::test]
    async fn fetch_all_warm_cache_fast_path_makes_no_upstream_calls() {
        let config = Config::default();
        let cache = Arc::new(Cache::new(config.ttl_min, config.ttl_max));
        for &key in &ALL_KEYS {
            cache.set(key, PriceValue::scalar(dec!(1)));
        }
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_window));
        let f = Fetcher::new(cache, rate_limiter, config);

        let result = f.fetch_all().await;
        assert!(result.cached);
        assert!(!result.partial);
        assert_eq!(result.data.len(), ALL_KEYS.len());
    }
}
