//! Bounded query-result cache with least-recently-used eviction and a
//! time-to-live per entry.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query_hash: u64,
    k: usize,
}

impl CacheKey {
    /// Keys hash the exact bit patterns of the query components.
    #[must_use]
    pub fn new(query: &[f32], k: usize) -> Self {
        let mut hasher = DefaultHasher::new();
        query.len().hash(&mut hasher);
        for x in query {
            x.to_bits().hash(&mut hasher);
        }
        Self {
            query_hash: hasher.finish(),
            k,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    last_used: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
}

#[derive(Debug, Clone)]
pub struct QueryCache<V> {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<CacheKey, CacheEntry<V>>,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V: Clone> QueryCache<V> {
    /// A capacity of zero disables caching.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: HashMap::new(),
            tick: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Like [`get`](Self::get) with an explicit clock reading.
    pub fn get_at(&mut self, key: &CacheKey, now: Instant) -> Option<V> {
        let expired = match self.entries.get(key) {
            None => {
                self.misses += 1;
                return None;
            }
            Some(entry) => now.saturating_duration_since(entry.inserted_at) >= self.ttl,
        };
        if expired {
            self.entries.remove(key);
            self.misses += 1;
            return None;
        }
        self.tick += 1;
        let tick = self.tick;
        let entry = self.entries.get_mut(key)?;
        entry.last_used = tick;
        self.hits += 1;
        Some(entry.value.clone())
    }

    pub fn insert(&mut self, key: CacheKey, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&mut self, key: CacheKey, value: V, now: Instant) {
        if self.capacity == 0 {
            return;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        self.tick += 1;
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                last_used: self.tick,
            },
        );
    }

    fn evict_lru(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| *k);
        if let Some(k) = victim {
            self.entries.remove(&k);
            self.evictions += 1;
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            len: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(x: f32) -> CacheKey {
        CacheKey::new(&[x, 0.0], 3)
    }

    #[test]
    fn key_depends_on_query_and_k() {
        assert_eq!(CacheKey::new(&[1.0, 2.0], 3), CacheKey::new(&[1.0, 2.0], 3));
        assert_ne!(CacheKey::new(&[1.0, 2.0], 3), CacheKey::new(&[1.0, 2.0], 4));
        assert_ne!(CacheKey::new(&[1.0, 2.0], 3), CacheKey::new(&[2.0, 1.0], 3));
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = QueryCache::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        cache.insert_at(key(1.0), "a", t0);
        cache.insert_at(key(2.0), "b", t0);
        // touch a so b becomes the eviction candidate
        assert_eq!(cache.get_at(&key(1.0), t0), Some("a"));
        cache.insert_at(key(3.0), "c", t0);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_at(&key(2.0), t0), None);
        assert_eq!(cache.get_at(&key(1.0), t0), Some("a"));
        assert_eq!(cache.get_at(&key(3.0), t0), Some("c"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let mut cache = QueryCache::new(4, Duration::from_secs(5));
        let t0 = Instant::now();
        cache.insert_at(key(1.0), 7_u32, t0);
        assert_eq!(cache.get_at(&key(1.0), t0 + Duration::from_secs(4)), Some(7));
        assert_eq!(cache.get_at(&key(1.0), t0 + Duration::from_secs(5)), None);
        assert!(cache.is_empty());
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn capacity_is_not_reserved_up_front() {
        let mut cache = QueryCache::new(usize::MAX, Duration::from_secs(60));
        assert!(cache.is_empty());
        cache.insert(key(1.0), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn reinserting_a_key_does_not_evict() {
        let mut cache = QueryCache::new(2, Duration::from_secs(60));
        cache.insert(key(1.0), 1);
        cache.insert(key(2.0), 2);
        cache.insert(key(2.0), 20);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key(2.0)), Some(20));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn zero_capacity_caches_nothing() {
        let mut cache = QueryCache::new(0, Duration::from_secs(60));
        cache.insert(key(1.0), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.get(&key(1.0)), None);
    }
}
