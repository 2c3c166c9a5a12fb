//! Capacity-bounded, TTL-validated, insertion-ordered map.
//!
//! [`BoundedCache`] backs the search cache, the comment cache and the
//! selection memory. Eviction is strictly FIFO by insertion: reads never
//! reorder entries, and overwriting a key counts as a fresh insertion (it
//! moves to the back and its age resets). TTL bounds staleness independently
//! of capacity pressure; an expired entry is reported as a miss and is
//! purged lazily by later writes.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::debug;

use crate::telemetry;

/// Configuration for one [`BoundedCache`] instance.
///
/// ```rust
/// # use huginn::cache::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(200)
///     .ttl(Duration::from_secs(300));
/// assert_eq!(config.max_entries, 200);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum number of entries. Default: 100.
    pub max_entries: usize,
    /// Time-to-live. `None` means entries never expire. Default: 60 seconds.
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            ttl: Some(Duration::from_secs(60)),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Disable expiry: entries leave only through eviction or removal.
    pub fn no_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    created_at: Instant,
}

/// Thread-safe FIFO + TTL map.
///
/// Reads share a read lock; `put`, eviction, `invalidate` and `clear` take
/// the write lock, so mutations are serialized per instance.
pub struct BoundedCache<K, V> {
    name: &'static str,
    config: CacheConfig,
    entries: RwLock<IndexMap<K, Entry<V>>>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create an empty cache. `name` labels its logs and metrics.
    pub fn new(name: &'static str, config: CacheConfig) -> Self {
        Self {
            name,
            config,
            entries: RwLock::new(IndexMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a live entry. Absent and expired entries are both misses.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let hit = self
            .read()
            .get(key)
            .filter(|entry| !self.is_expired(entry, now))
            .map(|entry| entry.value.clone());

        let counter = if hit.is_some() {
            telemetry::CACHE_HITS_TOTAL
        } else {
            telemetry::CACHE_MISSES_TOTAL
        };
        metrics::counter!(counter, "cache" => self.name).increment(1);
        hit
    }

    /// Insert or overwrite `key`.
    ///
    /// When the cache is full and `key` is new, expired entries are purged
    /// first; if that frees nothing, the oldest-inserted entry is evicted.
    /// Returns the evicted key, if any. After more than `max_entries`
    /// inserts the cache holds exactly `max_entries` only when none of them
    /// has expired; a purge can leave it smaller.
    pub fn put(&self, key: K, value: V) -> Option<K> {
        let now = Instant::now();
        let entry = Entry {
            value,
            created_at: now,
        };
        let mut map = self.write();

        if map.shift_remove(&key).is_some() {
            map.insert(key, entry);
            return None;
        }
        if self.config.max_entries == 0 {
            return None;
        }

        if map.len() >= self.config.max_entries {
            let ttl = self.config.ttl;
            map.retain(|_, e| !expired(ttl, e, now));
        }

        let mut evicted = None;
        while map.len() >= self.config.max_entries {
            match map.shift_remove_index(0) {
                Some((old, _)) => evicted = Some(old),
                None => break,
            }
        }
        map.insert(key, entry);
        drop(map);

        if evicted.is_some() {
            debug!(cache = self.name, "capacity reached, evicted oldest entry");
            metrics::counter!(telemetry::EVICTIONS_TOTAL, "collection" => self.name).increment(1);
        }
        evicted
    }

    /// Remove one entry. Returns whether it was present (expired or not).
    pub fn invalidate<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.write().shift_remove(key).is_some()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Live entries in insertion order (oldest first).
    pub fn entries(&self) -> Vec<(K, V)> {
        let now = Instant::now();
        self.read()
            .iter()
            .filter(|(_, e)| !self.is_expired(e, now))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    /// Replace the whole content, e.g. when rehydrating from the external
    /// store. Entries are inserted in iteration order with a fresh age and
    /// the usual capacity bound applies.
    pub fn replace_all(&self, entries: impl IntoIterator<Item = (K, V)>) {
        self.clear();
        for (key, value) in entries {
            self.put(key, value);
        }
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, entry: &Entry<V>, now: Instant) -> bool {
        expired(self.config.ttl, entry, now)
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<K, Entry<V>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<K, Entry<V>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn expired<V>(ttl: Option<Duration>, entry: &Entry<V>, now: Instant) -> bool {
    ttl.is_some_and(|ttl| now.saturating_duration_since(entry.created_at) >= ttl)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max: usize) -> BoundedCache<String, u32> {
        BoundedCache::new("test", CacheConfig::new().max_entries(max).no_ttl())
    }

    #[test]
    fn miss_then_hit() {
        let c = cache(4);
        assert_eq!(c.get("a"), None);
        c.put("a".into(), 1);
        assert_eq!(c.get("a"), Some(1));
    }

    #[test]
    fn overflow_evicts_oldest_inserted() {
        let c = cache(3);
        for (i, k) in ["a", "b", "c", "d"].iter().enumerate() {
            c.put(k.to_string(), i as u32);
        }
        assert_eq!(c.len(), 3);
        assert_eq!(c.get("a"), None);
        assert_eq!(c.get("d"), Some(3));
    }

    #[test]
    fn reads_do_not_reorder() {
        let c = cache(2);
        c.put("a".into(), 1);
        c.put("b".into(), 2);
        // Reading "a" must not protect it: FIFO, not LRU.
        assert_eq!(c.get("a"), Some(1));
        let evicted = c.put("c".into(), 3);
        assert_eq!(evicted.as_deref(), Some("a"));
    }

    #[test]
    fn overwrite_moves_key_to_back() {
        let c = cache(2);
        c.put("a".into(), 1);
        c.put("b".into(), 2);
        assert_eq!(c.put("a".into(), 10), None);
        let evicted = c.put("c".into(), 3);
        assert_eq!(evicted.as_deref(), Some("b"));
        assert_eq!(c.get("a"), Some(10));
    }

    #[test]
    fn zero_ttl_is_always_a_miss() {
        let c: BoundedCache<String, u32> =
            BoundedCache::new("test", CacheConfig::new().ttl(Duration::ZERO));
        c.put("a".into(), 1);
        assert_eq!(c.get("a"), None);
        assert!(c.entries().is_empty());
    }

    #[test]
    fn full_cache_purges_expired_before_evicting() {
        let c: BoundedCache<String, u32> = BoundedCache::new(
            "test",
            CacheConfig::new()
                .max_entries(2)
                .ttl(Duration::from_millis(20)),
        );
        c.put("a".into(), 1);
        c.put("b".into(), 2);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(c.put("c".into(), 3), None);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let c = cache(0);
        c.put("a".into(), 1);
        assert!(c.is_empty());
    }

    #[test]
    fn entries_and_replace_all_preserve_order() {
        let c = cache(3);
        c.replace_all(vec![("x".to_string(), 1), ("y".to_string(), 2)]);
        let keys: Vec<_> = c.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["x", "y"]);
    }

    #[test]
    fn invalidate_and_clear() {
        let c = cache(3);
        c.put("a".into(), 1);
        c.put("b".into(), 2);
        assert!(c.invalidate("a"));
        assert!(!c.invalidate("a"));
        c.clear();
        assert_eq!(c.get("b"), None);
        assert!(c.is_empty());
    }
}
