//! Size-bounded TTL store with least-recently-used eviction.
//!
//! Entries expire lazily on read and proactively through
//! [`TtlCache::purge_expired`]. When a write would exceed the byte budget the
//! entries with the oldest last access are evicted until the new one fits.
//! Recency is tracked with a monotonic tick per access indexed in a `BTreeMap`,
//! so finding the eviction victim is `O(log n)`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Estimated in-memory footprint of a cached value.
pub trait Weigh {
    fn weight(&self) -> usize;
}

impl Weigh for String {
    fn weight(&self) -> usize {
        self.len()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    created_at: Instant,
    last_access: Instant,
    access_count: u64,
    size_bytes: usize,
    tick: u64,
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    recency: BTreeMap<u64, String>,
    next_tick: u64,
    total_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V> Inner<V> {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> bool {
        let Some((_, key)) = self.recency.pop_first() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes);
            self.evictions += 1;
            tracing::debug!(key = %key, bytes = entry.size_bytes, "Evicted least recently used cache entry");
        }
        true
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: usize,
    pub max_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

/// Information about one cached entry, for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub key: String,
    pub size_bytes: usize,
    pub access_count: u64,
    pub age_secs: u64,
    pub ttl_remaining_secs: u64,
}

#[derive(Debug)]
pub struct TtlCache<V> {
    max_bytes: usize,
    default_ttl: Duration,
    inner: Mutex<Inner<V>>,
}

impl<V: Weigh + Clone> TtlCache<V> {
    pub fn new(max_bytes: usize, default_ttl: Duration) -> Self {
        Self {
            max_bytes,
            default_ttl,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                next_tick: 0,
                total_bytes: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Look up `key`, dropping it if it expired before `now`.
    pub fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut inner = self.lock();

        let expired = match inner.entries.get(key) {
            None => {
                inner.misses += 1;
                return None;
            }
            Some(entry) => now >= entry.expires_at,
        };
        if expired {
            inner.remove(key);
            inner.misses += 1;
            return None;
        }

        let tick = inner.bump();
        inner.hits += 1;
        let entry = inner.entries.get_mut(key)?;
        let old_tick = std::mem::replace(&mut entry.tick, tick);
        entry.last_access = now;
        entry.access_count += 1;
        let value = entry.value.clone();
        inner.recency.remove(&old_tick);
        inner.recency.insert(tick, key.to_string());
        Some(value)
    }

    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> bool {
        self.set_at(key, value, ttl, Instant::now())
    }

    /// Store `value` under `key`. Returns `false` when the value alone is
    /// larger than the whole budget and was not stored.
    pub fn set_at(&self, key: &str, value: V, ttl: Option<Duration>, now: Instant) -> bool {
        let size_bytes = key.len() + value.weight();
        if size_bytes > self.max_bytes {
            tracing::debug!(key = %key, bytes = size_bytes, "Value exceeds cache budget, not caching");
            return false;
        }

        let mut inner = self.lock();
        inner.remove(key);
        while inner.total_bytes + size_bytes > self.max_bytes {
            if !inner.evict_oldest() {
                break;
            }
        }

        let tick = inner.bump();
        inner.recency.insert(tick, key.to_string());
        inner.total_bytes += size_bytes;
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now + ttl.unwrap_or(self.default_ttl),
                created_at: now,
                last_access: now,
                access_count: 0,
                size_bytes,
                tick,
            },
        );
        true
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let count = inner.entries.len();
        inner.entries.clear();
        inner.recency.clear();
        inner.total_bytes = 0;
        count
    }

    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let mut inner = self.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| now >= e.expires_at)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }

    pub fn total_bytes(&self) -> usize {
        self.lock().total_bytes
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            entries: inner.entries.len(),
            total_bytes: inner.total_bytes,
            max_bytes: self.max_bytes,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            hit_rate: if lookups == 0 { 0.0 } else { inner.hits as f64 / lookups as f64 },
        }
    }

    /// Live entries, most recently used first.
    pub fn entries(&self) -> Vec<EntryInfo> {
        let now = Instant::now();
        let inner = self.lock();
        inner
            .recency
            .values()
            .rev()
            .filter_map(|key| inner.entries.get(key).map(|e| (key, e)))
            .filter(|(_, e)| now < e.expires_at)
            .map(|(key, e)| EntryInfo {
                key: key.clone(),
                size_bytes: e.size_bytes,
                access_count: e.access_count,
                age_secs: now.saturating_duration_since(e.created_at).as_secs(),
                ttl_remaining_secs: e.expires_at.saturating_duration_since(now).as_secs(),
            })
            .collect()
    }

    #[cfg(test)]
    fn last_access(&self, key: &str) -> Option<Instant> {
        self.lock().entries.get(key).map(|e| e.last_access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = TtlCache::new(1024, Duration::from_secs(300));
        let t0 = Instant::now();
        assert!(cache.set_at("k", "value".to_string(), Some(secs(1.0)), t0));

        assert_eq!(cache.get_at("k", t0 + secs(0.5)).as_deref(), Some("value"));
        assert_eq!(cache.get_at("k", t0 + secs(1.5)), None);
        assert!(cache.is_empty(), "expired entry is dropped on read");
    }

    #[test]
    fn test_default_ttl_applies() {
        let cache = TtlCache::new(1024, Duration::from_secs(2));
        let t0 = Instant::now();
        cache.set_at("k", "v".to_string(), None, t0);
        assert!(cache.get_at("k", t0 + secs(1.9)).is_some());
        assert!(cache.get_at("k", t0 + secs(2.0)).is_none());
    }

    #[test]
    fn test_least_recently_used_is_evicted_first() {
        // Each entry weighs 1 (key) + 9 (value) = 10 bytes
        let cache = TtlCache::new(30, Duration::from_secs(60));
        let t0 = Instant::now();
        cache.set_at("a", "aaaaaaaaa".to_string(), None, t0);
        cache.set_at("b", "bbbbbbbbb".to_string(), None, t0);
        cache.set_at("c", "ccccccccc".to_string(), None, t0);

        // Touch "a" so "b" becomes the oldest
        assert!(cache.get_at("a", t0 + secs(1.0)).is_some());
        assert_eq!(cache.last_access("a"), Some(t0 + secs(1.0)));

        cache.set_at("d", "ddddddddd".to_string(), None, t0 + secs(2.0));
        assert_eq!(cache.len(), 3);
        assert!(cache.get_at("b", t0 + secs(3.0)).is_none());
        assert!(cache.get_at("a", t0 + secs(3.0)).is_some());
        assert_eq!(cache.total_bytes(), 30);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_oversized_value_is_refused() {
        let cache = TtlCache::new(8, Duration::from_secs(60));
        assert!(cache.set("small", "x".to_string(), None));
        assert!(!cache.set("big", "0123456789".to_string(), None));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_overwrite_replaces_size() {
        let cache = TtlCache::new(100, Duration::from_secs(60));
        cache.set("k", "12345".to_string(), None);
        cache.set("k", "12".to_string(), None);
        assert_eq!(cache.total_bytes(), 3);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_purge_and_clear() {
        let cache = TtlCache::new(1024, Duration::from_secs(60));
        let t0 = Instant::now();
        cache.set_at("short", "v".to_string(), Some(secs(1.0)), t0);
        cache.set_at("long", "v".to_string(), Some(secs(10.0)), t0);
        assert_eq!(cache.purge_expired_at(t0 + secs(5.0)), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.clear(), 1);
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let cache = TtlCache::new(1024, Duration::from_secs(60));
        cache.set("k", "v".to_string(), None);
        cache.get("k");
        cache.get("missing");
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }
}
