//! TTL cache with randomised expiration.
//!
//! Each write draws its own TTL independently from `[TTL_MIN, TTL_MAX]`,
//! backed by an `RwLock<HashMap<...>>`, plus the hit/miss/set counters the
//! HTTP health endpoint reports. Timestamps use `tokio::time::Instant`
//! rather than `std::time::Instant` so tests can drive TTL expiry
//! deterministically with `tokio::time::pause()` + `tokio::time::advance()`.

use rand::Rng;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;

use crate::value::{PriceKey, PriceValue};

struct Entry {
    value: PriceValue,
    created_at: Instant,
    expires_at: Instant,
}

/// A single entry's age/ttl/expired snapshot, part of `CacheStats`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EntrySnapshot {
    pub key: String,
    #[serde(rename = "age")]
    pub age_secs: u64,
    #[serde(rename = "ttl")]
    pub ttl_secs: u64,
    pub expired: bool,
}

/// Aggregate cache statistics reported at `/api/health`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    #[serde(rename = "hitRate")]
    pub hit_rate: f64,
    pub entries: Vec<EntrySnapshot>,
}

struct Counters {
    hits: u64,
    misses: u64,
    sets: u64,
}

/// In-memory mapping from `PriceKey` to `(value, createdAt, expiresAt)`,
/// with randomised TTL on every write.
pub struct Cache {
    store: RwLock<HashMap<PriceKey, Entry>>,
    counters: RwLock<Counters>,
    ttl_min: Duration,
    ttl_max: Duration,
}

impl Cache {
    pub fn new(ttl_min: Duration, ttl_max: Duration) -> Self {
        assert!(ttl_min <= ttl_max, "ttl_min must be <= ttl_max");
        Self {
            store: RwLock::new(HashMap::new()),
            counters: RwLock::new(Counters {
                hits: 0,
                misses: 0,
                sets: 0,
            }),
            ttl_min,
            ttl_max,
        }
    }

    /// Draw a fresh TTL and write the entry. Independent per call — two
    /// consecutive writes to the same key draw independent TTLs.
    pub fn set(&self, key: PriceKey, value: PriceValue) {
        let ttl = self.draw_ttl();
        let now = Instant::now();
        let entry = Entry {
            value,
            created_at: now,
            expires_at: now + ttl,
        };
        self.store.write().unwrap().insert(key, entry);
        self.counters.write().unwrap().sets += 1;
    }

    fn draw_ttl(&self) -> Duration {
        if self.ttl_min == self.ttl_max {
            return self.ttl_min;
        }
        let mut rng = rand::thread_rng();
        let min_nanos = self.ttl_min.as_nanos() as u64;
        let max_nanos = self.ttl_max.as_nanos() as u64;
        Duration::from_nanos(rng.gen_range(min_nanos..=max_nanos))
    }

    /// Returns the value if a non-expired entry exists, incrementing
    /// `hits`; otherwise a miss, incrementing `misses`. A miss due to
    /// expiry does not remove the entry — stale entries are the
    /// graceful-degradation fallback.
    pub fn get(&self, key: PriceKey) -> Option<PriceValue> {
        let now = Instant::now();
        let hit = {
            let store = self.store.read().unwrap();
            store
                .get(&key)
                .filter(|e| now < e.expires_at)
                .map(|e| e.value.clone())
        };
        let mut counters = self.counters.write().unwrap();
        if hit.is_some() {
            counters.hits += 1;
        } else {
            counters.misses += 1;
        }
        hit
    }

    /// Returns the value regardless of expiry — the fallback path for
    /// exhausted retries.
    pub fn get_raw(&self, key: PriceKey) -> Option<PriceValue> {
        self.store.read().unwrap().get(&key).map(|e| e.value.clone())
    }

    /// True iff a non-expired entry exists.
    pub fn has(&self, key: PriceKey) -> bool {
        let now = Instant::now();
        self.store
            .read()
            .unwrap()
            .get(&key)
            .is_some_and(|e| now < e.expires_at)
    }

    /// Remaining TTL, 0 if absent or already expired.
    pub fn remaining_ttl(&self, key: PriceKey) -> Duration {
        let now = Instant::now();
        self.store
            .read()
            .unwrap()
            .get(&key)
            .map(|e| e.expires_at.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Snapshot of all `(key, non-expired?)` pairs, used by the
    /// scheduler to decide which keys need a refresh.
    pub fn entries(&self) -> Vec<(PriceKey, Duration)> {
        let now = Instant::now();
        self.store
            .read()
            .unwrap()
            .iter()
            .map(|(k, e)| (*k, e.expires_at.saturating_duration_since(now)))
            .collect()
    }

    pub fn delete(&self, key: PriceKey) {
        self.store.write().unwrap().remove(&key);
    }

    pub fn clear(&self) {
        self.store.write().unwrap().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let mut entries: Vec<EntrySnapshot> = self
            .store
            .read()
            .unwrap()
            .iter()
            .map(|(k, e)| EntrySnapshot {
                key: k.to_string(),
                age_secs: now.saturating_duration_since(e.created_at).as_secs(),
                ttl_secs: e.expires_at.saturating_duration_since(now).as_secs(),
                expired: now >= e.expires_at,
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        let counters = self.counters.read().unwrap();
        let total_reads = counters.hits + counters.misses;
        let hit_rate = if total_reads == 0 {
            0.0
        } else {
            counters.hits as f64 / total_reads as f64
        };

        CacheStats {
            size: self.store.read().unwrap().len(),
            hits: counters.hits,
            misses: counters.misses,
            sets: counters.sets,
            hit_rate,
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PriceKey::Btc;
    use rust_decimal_macros::dec;

    fn cache() -> Cache {
        Cache::new(Duration::from_secs(300), Duration::from_secs(600))
    }

    #[tokio::test]
    async fn set_then_get_within_ttl_returns_value() {
        let c = cache();
        c.set(Btc, PriceValue::scalar(dec!(100000)));
        assert_eq!(c.get(Btc), Some(PriceValue::scalar(dec!(100000))));
    }

    #[tokio::test]
    async fn last_write_wins_and_rerandomises_ttl() {
        let c = cache();
        c.set(Btc, PriceValue::scalar(dec!(1)));
        c.set(Btc, PriceValue::scalar(dec!(2)));
        assert_eq!(c.get(Btc), Some(PriceValue::scalar(dec!(2))));
        assert_eq!(c.stats().sets, 2);
    }

    #[tokio::test]
    async fn clear_makes_every_key_miss() {
        let c = cache();
        c.set(Btc, PriceValue::scalar(dec!(1)));
        c.clear();
        assert_eq!(c.get(Btc), None);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_is_a_miss_but_retains_the_entry_for_fallback() {
        let c = Cache::new(Duration::from_secs(10), Duration::from_secs(10));
        c.set(Btc, PriceValue::scalar(dec!(95000)));
        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(c.get(Btc), None);
        assert_eq!(c.get_raw(Btc), Some(PriceValue::scalar(dec!(95000))));
    }

    #[tokio::test]
    async fn ttl_draws_land_in_bounds_and_are_not_constant() {
        let c = cache();
        let mut ttls = std::collections::HashSet::new();
        for _ in 0..50 {
            c.set(Btc, PriceValue::scalar(dec!(1)));
            let ttl = c.remaining_ttl(Btc);
            assert!(ttl >= Duration::from_secs(299) && ttl <= Duration::from_secs(600));
            ttls.insert(ttl.as_secs());
        }
        assert!(ttls.len() > 1, "TTL draws should not all collapse to one value");
    }

    #[tokio::test]
    async fn hit_and_miss_counters_match_get_calls() {
        let c = cache();
        c.set(Btc, PriceValue::scalar(dec!(1)));
        c.get(Btc);
        c.get(PriceKey::EurUsd);
        let stats = c.stats();
        assert_eq!(stats.hits + stats.misses, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn stats_size_matches_store_len() {
        let c = cache();
        c.set(Btc, PriceValue::scalar(dec!(1)));
        c.set(PriceKey::EurUsd, PriceValue::scalar(dec!(1)));
        assert_eq!(c.stats().size, 2);
    }
}
