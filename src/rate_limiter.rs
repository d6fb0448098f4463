//! Sliding-window quota enforcer, one ledger per upstream.
//!
//! A `HashMap<String, _>` behind a lock, entries created lazily with
//! `or_insert_with`, each holding an append-only list of admitted request
//! timestamps. A `Mutex` is used instead of an `RwLock` because every
//! operation here is a read-then-mutate cleanup pass, so a plain lock
//! buys nothing over a reader-writer one.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// A point-in-time usage snapshot for one upstream.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Usage {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    #[serde(rename = "resetIn")]
    pub reset_in_secs: u64,
}

struct Ledger {
    timestamps: VecDeque<Instant>,
}

impl Ledger {
    fn new() -> Self {
        Self {
            timestamps: VecDeque::new(),
        }
    }

    /// Drop every timestamp older than `now - window`.
    fn cleanup(&mut self, now: Instant, window: Duration) {
        while let Some(&front) = self.timestamps.front() {
            if now.saturating_duration_since(front) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Per-upstream sliding-window request counter.
pub struct RateLimiter {
    ledgers: Mutex<HashMap<String, Ledger>>,
    window: Duration,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            ledgers: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// Cleans up stale timestamps, then returns true iff the retained
    /// count is still below `limit`.
    pub fn can_make_request(&self, upstream: &str, limit: u32) -> bool {
        let now = Instant::now();
        let mut ledgers = self.ledgers.lock().unwrap();
        let ledger = ledgers.entry(upstream.to_string()).or_insert_with(Ledger::new);
        ledger.cleanup(now, self.window);
        (ledger.timestamps.len() as u32) < limit
    }

    /// Records a request against the upstream's ledger. Callers must
    /// call this at the moment of dispatch — treating a failed dispatch
    /// as free would let retry storms blow past the quota.
    pub fn record_request(&self, upstream: &str) {
        let now = Instant::now();
        let mut ledgers = self.ledgers.lock().unwrap();
        let ledger = ledgers.entry(upstream.to_string()).or_insert_with(Ledger::new);
        ledger.cleanup(now, self.window);
        ledger.timestamps.push_back(now);
    }

    pub fn usage(&self, upstream: &str, limit: u32) -> Usage {
        let now = Instant::now();
        let mut ledgers = self.ledgers.lock().unwrap();
        let ledger = ledgers.entry(upstream.to_string()).or_insert_with(Ledger::new);
        ledger.cleanup(now, self.window);

        let used = ledger.timestamps.len() as u32;
        let reset_in = ledger
            .timestamps
            .front()
            .map(|&oldest| {
                let elapsed = now.saturating_duration_since(oldest);
                self.window.saturating_sub(elapsed)
            })
            .unwrap_or(Duration::ZERO);

        Usage {
            used,
            limit,
            remaining: limit.saturating_sub(used),
            reset_in_secs: reset_in.as_secs(),
        }
    }

    pub fn reset(&self) {
        self.ledgers.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_the_limit_then_denies() {
        let rl = RateLimiter::new(Duration::from_secs(60));
        for _ in 0..5 {
            assert!(rl.can_make_request("market-data", 5));
            rl.record_request("market-data");
        }
        assert!(!rl.can_make_request("market-data", 5));
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides_and_frees_capacity() {
        let rl = RateLimiter::new(Duration::from_secs(60));
        for _ in 0..5 {
            rl.record_request("market-data");
        }
        assert!(!rl.can_make_request("market-data", 5));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(rl.can_make_request("market-data", 5));
        assert_eq!(rl.usage("market-data", 5).used, 0);
    }

    #[tokio::test]
    async fn usage_reports_remaining_and_reset_in() {
        let rl = RateLimiter::new(Duration::from_secs(60));
        rl.record_request("crypto");
        let usage = rl.usage("crypto", 5);
        assert_eq!(usage.used, 1);
        assert_eq!(usage.remaining, 4);
        assert!(usage.reset_in_secs <= 60);
    }

    #[tokio::test]
    async fn reset_clears_every_ledger() {
        let rl = RateLimiter::new(Duration::from_secs(60));
        rl.record_request("crypto");
        rl.record_request("fx");
        rl.reset();
        assert_eq!(rl.usage("crypto", 5).used, 0);
        assert_eq!(rl.usage("fx", 5).used, 0);
    }

    #[tokio::test]
    async fn independent_upstreams_have_independent_quotas() {
        let rl = RateLimiter::new(Duration::from_secs(60));
        for _ in 0..5 {
            rl.record_request("market-data");
        }
        assert!(!rl.can_make_request("market-data", 5));
        assert!(rl.can_make_request("crypto", 5));
    }
}
