//! Bounded LRU cache with lazy TTL expiry.
//!
//! [`AdaptiveCache`] backs the query-result cache, the related-cases cache
//! and the corpus statistics cache. All state (entry map, recency order and
//! counters) sits behind one `parking_lot::Mutex`, so concurrent `get` and
//! `put` calls see a consistent LRU order and never double count.
//!
//! Expiry is checked on read only; there is no background sweeper. An
//! entry past its TTL is removed on the read that finds it and counted as a
//! miss. Values are handed out as `Arc<V>` so callers never hold the lock.
//!
//! ```text
//! get(k) ──▶ absent ─────────────────────▶ miss
//!        ├─▶ present, expired ──▶ remove ▶ miss
//!        ├─▶ present, key mismatch ▶ remove ▶ miss (logged)
//!        └─▶ present, fresh ──▶ touch ──▶ hit
//! ```

use std::fmt::Display;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Serialize, Serializer};

struct CacheEntry<K, V> {
    key: K,
    value: Arc<V>,
    created: Instant,
    last_access: Instant,
    hits: u64,
}

struct Inner<K: Hash + Eq, V> {
    entries: LruCache<K, CacheEntry<K, V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

pub struct AdaptiveCache<K: Hash + Eq, V> {
    name: &'static str,
    ttl: Duration,
    inner: Mutex<Inner<K, V>>,
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Per-entry view reported by [`AdaptiveCache::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryInfo {
    pub key: String,
    #[serde(rename = "age_secs", serialize_with = "serialize_secs")]
    pub age: Duration,
    #[serde(rename = "idle_secs", serialize_with = "serialize_secs")]
    pub idle: Duration,
    pub hits: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub name: &'static str,
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses) since the last reset; 0.0 before any lookup.
    pub hit_rate: f64,
    pub evictions: u64,
    pub expirations: u64,
    #[serde(rename = "ttl_secs", serialize_with = "serialize_secs")]
    pub ttl: Duration,
    /// Most recently used first.
    pub entries: Vec<CacheEntryInfo>,
}

enum Lookup<V> {
    Hit(Arc<V>),
    Absent,
    Expired,
    Fault,
}

impl<K, V> AdaptiveCache<K, V>
where
    K: Hash + Eq + Clone + Display,
{
    pub fn new(name: &'static str, capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            ttl,
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
            }),
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let lookup = match inner.entries.get_mut(key) {
            None => Lookup::Absent,
            Some(entry) if entry.key != *key => Lookup::Fault,
            Some(entry) if now.duration_since(entry.created) >= self.ttl => Lookup::Expired,
            Some(entry) => {
                entry.last_access = now;
                entry.hits += 1;
                Lookup::Hit(Arc::clone(&entry.value))
            }
        };

        match lookup {
            Lookup::Hit(value) => {
                inner.hits += 1;
                tracing::debug!(cache = self.name, key = %key, "cache hit");
                Some(value)
            }
            Lookup::Absent => {
                inner.misses += 1;
                None
            }
            Lookup::Expired => {
                inner.entries.pop(key);
                inner.expirations += 1;
                inner.misses += 1;
                tracing::debug!(cache = self.name, key = %key, "cache entry expired");
                None
            }
            Lookup::Fault => {
                inner.entries.pop(key);
                inner.misses += 1;
                tracing::warn!(cache = self.name, key = %key, "inconsistent cache entry dropped");
                None
            }
        }
    }

    /// Insert or replace. A replaced entry starts over: new creation time,
    /// zero hits, most recently used.
    pub fn put(&self, key: K, value: V) -> Arc<V> {
        let now = Instant::now();
        let value = Arc::new(value);
        let entry = CacheEntry {
            key: key.clone(),
            value: Arc::clone(&value),
            created: now,
            last_access: now,
            hits: 0,
        };

        let mut inner = self.inner.lock();
        if let Some((old_key, _)) = inner.entries.push(key.clone(), entry) {
            if old_key != key {
                inner.evictions += 1;
                tracing::debug!(cache = self.name, evicted = %old_key, "cache eviction");
            }
        }
        value
    }

    pub fn remove(&self, key: &K) -> bool {
        self.inner.lock().entries.pop(key).is_some()
    }

    /// Drop every entry. Counters are kept.
    pub fn invalidate_all(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn reset_stats(&self) {
        let mut inner = self.inner.lock();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
        inner.expirations = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let inner = self.inner.lock();
        let lookups = inner.hits + inner.misses;

        CacheStats {
            name: self.name,
            size: inner.entries.len(),
            capacity: inner.entries.cap().get(),
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if lookups > 0 {
                inner.hits as f64 / lookups as f64
            } else {
                0.0
            },
            evictions: inner.evictions,
            expirations: inner.expirations,
            ttl: self.ttl,
            entries: inner
                .entries
                .iter()
                .map(|(k, e)| CacheEntryInfo {
                    key: k.to_string(),
                    age: now.duration_since(e.created),
                    idle: now.duration_since(e.last_access),
                    hits: e.hits,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn cache(capacity: usize) -> AdaptiveCache<String, Vec<i64>> {
        AdaptiveCache::new("test", capacity, Duration::from_secs(3600))
    }

    #[test]
    fn put_then_get_returns_value() {
        let c = cache(4);
        assert!(c.get(&"a".to_string()).is_none());
        c.put("a".into(), vec![1, 2, 3]);
        assert_eq!(*c.get(&"a".to_string()).unwrap(), vec![1, 2, 3]);

        let s = c.stats();
        assert_eq!(s.hits, 1);
        assert_eq!(s.misses, 1);
        assert!((s.hit_rate - 0.5).abs() < 1e-9);
        assert_eq!(s.entries[0].hits, 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let c = cache(2);
        c.put("a".into(), vec![1]);
        c.put("b".into(), vec![2]);
        // Touch "a" so "b" becomes the eviction candidate.
        assert!(c.get(&"a".to_string()).is_some());
        c.put("c".into(), vec![3]);

        assert_eq!(c.len(), 2);
        assert!(c.get(&"b".to_string()).is_none());
        assert!(c.get(&"a".to_string()).is_some());
        assert!(c.get(&"c".to_string()).is_some());
        assert_eq!(c.stats().evictions, 1);
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let c = cache(3);
        for i in 0..20 {
            c.put(format!("k{}", i), vec![i]);
            assert!(c.len() <= 3);
        }
        let keys: Vec<String> = c.stats().entries.into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["k19", "k18", "k17"]);
    }

    #[test]
    fn put_replaces_and_refreshes() {
        let c = cache(2);
        c.put("a".into(), vec![1]);
        c.put("b".into(), vec![2]);
        c.put("a".into(), vec![10]);
        c.put("c".into(), vec![3]);

        assert_eq!(*c.get(&"a".to_string()).unwrap(), vec![10]);
        assert!(c.get(&"b".to_string()).is_none());
        assert_eq!(c.stats().evictions, 1);
    }

    #[test]
    fn expired_entries_are_misses() {
        let c: AdaptiveCache<String, u8> =
            AdaptiveCache::new("ttl", 4, Duration::from_millis(30));
        c.put("a".into(), 1);
        assert!(c.get(&"a".to_string()).is_some());
        thread::sleep(Duration::from_millis(60));
        assert!(c.get(&"a".to_string()).is_none());

        let s = c.stats();
        assert_eq!(s.size, 0);
        assert_eq!(s.expirations, 1);
        assert_eq!(s.hits, 1);
        assert_eq!(s.misses, 1);
    }

    #[test]
    fn mismatched_entry_is_dropped_as_miss() {
        let c = cache(4);
        {
            let now = Instant::now();
            let mut inner = c.inner.lock();
            inner.entries.put(
                "a".to_string(),
                CacheEntry {
                    key: "not-a".to_string(),
                    value: Arc::new(vec![9]),
                    created: now,
                    last_access: now,
                    hits: 0,
                },
            );
        }
        assert!(c.get(&"a".to_string()).is_none());
        assert_eq!(c.len(), 0);
        assert_eq!(c.stats().misses, 1);
    }

    #[test]
    fn invalidate_and_reset() {
        let c = cache(4);
        c.put("a".into(), vec![1]);
        c.get(&"a".to_string());
        c.invalidate_all();
        assert!(c.is_empty());
        assert_eq!(c.stats().hits, 1);

        c.reset_stats();
        let s = c.stats();
        assert_eq!((s.hits, s.misses), (0, 0));
        assert_eq!(s.hit_rate, 0.0);
        assert!(!c.remove(&"a".to_string()));
    }

    #[test]
    fn concurrent_access_counts_every_lookup() {
        let c = Arc::new(cache(8));
        c.put("shared".into(), vec![1]);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&c);
                thread::spawn(move || {
                    for _ in 0..100 {
                        assert!(c.get(&"shared".to_string()).is_some());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let s = c.stats();
        assert_eq!(s.hits, 800);
        assert_eq!(s.entries[0].hits, 800);
    }
}
