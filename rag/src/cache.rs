//! Bounded, TTL-based memoization of executed query results.
//!
//! Entries expire a fixed time after insertion. When the cache is full a
//! new key evicts the entry inserted earliest, regardless of how recently it
//! was read.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::debug;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Cache key: SHA-256 of whitespace-normalized SQL plus bound parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(sql: &str, params: Option<&serde_json::Value>) -> Self {
        let normalized = sql.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        if let Some(params) = params {
            hasher.update(b"\0");
            hasher.update(params.to_string().as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(sql: &str) -> Self {
        CacheKey::new(sql, None)
    }
}

/// Hit/miss counters and occupancy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub hit_rate: f64,
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    seq: u64,
}

struct Inner<V> {
    entries: HashMap<CacheKey, Entry<V>>,
    /// Insertion sequence to key; the first entry is the oldest insertion.
    order: BTreeMap<u64, CacheKey>,
    next_seq: u64,
    hits: u64,
    misses: u64,
}

impl<V> Inner<V> {
    fn remove(&mut self, key: &CacheKey) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }
}

/// Thread-safe result cache shared by concurrent requests.
pub struct ResultCache<V> {
    ttl: Duration,
    max_size: usize,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> ResultCache<V> {
    /// A `max_size` of zero disables caching.
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            ttl,
            max_size,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
                hits: 0,
                misses: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up a live entry. Expired entries are dropped and count as misses.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let live = inner
            .entries
            .get(key)
            .filter(|entry| entry.inserted_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone());

        if live.is_some() {
            inner.hits += 1;
            debug!("Cache hit for {}", &key.as_str()[..12]);
        } else {
            inner.remove(key);
            inner.misses += 1;
        }
        live
    }

    /// Insert or refresh an entry. Inserting a new key into a full cache
    /// first evicts the earliest insertion.
    pub fn set(&self, key: CacheKey, value: V) {
        if self.max_size == 0 {
            return;
        }
        let mut inner = self.lock();

        if inner.remove(&key).is_none() {
            while inner.entries.len() >= self.max_size {
                let Some((_, oldest)) = inner.order.pop_first() else {
                    break;
                };
                inner.entries.remove(&oldest);
                debug!("Cache evicted {}", &oldest.as_str()[..12]);
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, key.clone());
        debug!("Cache insert {}", &key.as_str()[..12]);
        inner.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                seq,
            },
        );
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let total = inner.hits + inner.misses;
        CacheStats {
            size: inner.entries.len(),
            max_size: self.max_size,
            hits: inner.hits,
            misses: inner.misses,
            total_requests: total,
            hit_rate: if total == 0 {
                0.0
            } else {
                inner.hits as f64 / total as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn cache(max_size: usize) -> ResultCache<String> {
        ResultCache::new(Duration::from_secs(300), max_size)
    }

    #[test]
    fn test_miss_then_hit() {
        let cache = cache(10);
        let key = CacheKey::from("SELECT 1");

        assert_eq!(cache.get(&key), None);
        assert_eq!(cache.stats().misses, 1);

        cache.set(key.clone(), "R".to_string());
        assert_eq!(cache.get(&key).as_deref(), Some("R"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_requests, 2);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overflow_evicts_earliest_insertion() {
        let cache = cache(3);
        for sql in ["SELECT 1", "SELECT 2", "SELECT 3"] {
            cache.set(CacheKey::from(sql), sql.to_string());
        }
        // Reading the oldest entry does not protect it.
        assert!(cache.get(&CacheKey::from("SELECT 1")).is_some());

        cache.set(CacheKey::from("SELECT 4"), "SELECT 4".to_string());
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(&CacheKey::from("SELECT 1")), None);
        for sql in ["SELECT 2", "SELECT 3", "SELECT 4"] {
            assert!(cache.get(&CacheKey::from(sql)).is_some(), "{sql}");
        }
    }

    #[test]
    fn test_refreshing_a_key_does_not_evict() {
        let cache = cache(2);
        cache.set(CacheKey::from("SELECT 1"), "a".to_string());
        cache.set(CacheKey::from("SELECT 2"), "b".to_string());
        cache.set(CacheKey::from("SELECT 1"), "c".to_string());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&CacheKey::from("SELECT 1")).as_deref(), Some("c"));

        // "SELECT 2" is now the earliest insertion.
        cache.set(CacheKey::from("SELECT 3"), "d".to_string());
        assert_eq!(cache.get(&CacheKey::from("SELECT 2")), None);
        assert!(cache.get(&CacheKey::from("SELECT 1")).is_some());
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache: ResultCache<String> = ResultCache::new(Duration::ZERO, 10);
        let key = CacheKey::from("SELECT 1");
        cache.set(key.clone(), "R".to_string());

        assert_eq!(cache.get(&key), None);
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let cache = cache(0);
        cache.set(CacheKey::from("SELECT 1"), "R".to_string());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = cache(5);
        cache.set(CacheKey::from("SELECT 1"), "R".to_string());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&CacheKey::from("SELECT 1")), None);
    }

    #[test]
    fn test_key_normalizes_whitespace_and_includes_params() {
        assert_eq!(
            CacheKey::from("SELECT  *\n FROM o"),
            CacheKey::from("SELECT * FROM o")
        );
        let params = serde_json::json!({"limit": 10});
        assert_ne!(
            CacheKey::new("SELECT * FROM o", Some(&params)),
            CacheKey::from("SELECT * FROM o")
        );
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(cache(50));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let key = CacheKey::from(format!("SELECT {}", t * 100 + i).as_str());
                        cache.set(key.clone(), i.to_string());
                        cache.get(&key);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 50);
        assert_eq!(cache.stats().total_requests, 800);
    }
}
