//! The dual TTL cache behind CodeMode's tool-specs and tool-selection
//! lookups (spec.md §4.4 "TTL cache").
//!
//! Grounded on the teacher's `cache.rs` `ResponseCache`: a `DashMap` keyed
//! store with `Instant`-based expiry and atomic hit/miss counters,
//! generalized here to a named, independently-TTL'd cache usable for both
//! CodeMode layers plus a background cleanup loop matching the teacher's
//! file-watcher task shape (`tokio::spawn` + `tokio::time::interval`).

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A concurrent, TTL-expiring cache with hit/miss counters.
pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Build an empty cache with a fixed TTL applied to every insert.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up `key`, returning `None` on a miss or an expired entry (an
    /// expired entry is evicted on read, not just on cleanup).
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.entries.remove(key);
        None
    }

    /// Insert or replace `key`'s value, resetting its TTL.
    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop a single entry ahead of its TTL.
    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Evict every expired entry; returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    /// `(hits, misses)` since construction.
    #[must_use]
    pub fn counters(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }
}

/// Spawn a background task that sweeps `cache` for expired entries every
/// `interval`, for as long as `cache` (held via `Arc`) has other owners.
pub fn spawn_cleanup<K, V>(cache: Arc<TtlCache<K, V>>, interval: Duration) -> tokio::task::JoinHandle<()>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if Arc::strong_count(&cache) == 1 {
                break;
            }
            cache.sweep();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::from_millis(1));
        cache.insert("a", 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn hit_and_miss_counters_track_lookups() {
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1);
        cache.get(&"a");
        cache.get(&"missing");
        assert_eq!(cache.counters(), (1, 1));
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::from_millis(1));
        cache.insert("a", 1);
        std::thread::sleep(Duration::from_millis(5));
        cache.insert("b", 2);
        let removed = cache.sweep();
        assert_eq!(removed, 1);
        assert_eq!(cache.get(&"b"), Some(2));
    }
}
