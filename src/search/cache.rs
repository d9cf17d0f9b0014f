use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use crate::core::types::Key;

/// LRU cache of fuzzy search results, cleared on every insert
pub struct QueryCache {
    cache: Mutex<LruCache<QueryKey, Vec<Key>>>,
    pub size_limit: usize,
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct QueryKey {
    pub query: Key,
    pub max_edits: usize,
    pub transpositions: bool,
}

impl QueryKey {
    pub fn new(query: &[u8], max_edits: usize, transpositions: bool) -> Self {
        QueryKey {
            query: query.to_vec(),
            max_edits,
            transpositions,
        }
    }
}

impl QueryCache {
    /// None when `size_limit` is 0
    pub fn new(size_limit: usize) -> Option<Self> {
        let cap = NonZeroUsize::new(size_limit)?;
        Some(QueryCache {
            cache: Mutex::new(LruCache::new(cap)),
            size_limit,
            hit_count: AtomicUsize::new(0),
            miss_count: AtomicUsize::new(0),
        })
    }

    pub fn get(&self, key: &QueryKey) -> Option<Vec<Key>> {
        let mut cache = self.cache.lock();
        if let Some(results) = cache.get(key) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            Some(results.clone())
        } else {
            self.miss_count.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn put(&self, key: QueryKey, results: Vec<Key>) {
        self.cache.lock().put(key, results);
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            size: self.cache.lock().len(),
            capacity: self.size_limit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hit_count: usize,
    pub miss_count: usize,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_disables_cache() {
        assert!(QueryCache::new(0).is_none());
    }

    #[test]
    fn evicts_least_recent_and_counts_hits() {
        let cache = QueryCache::new(2).unwrap();
        let a = QueryKey::new(b"a", 1, false);
        let b = QueryKey::new(b"b", 1, false);
        let c = QueryKey::new(b"c", 1, false);

        cache.put(a.clone(), vec![b"a".to_vec()]);
        cache.put(b.clone(), vec![]);
        assert_eq!(cache.get(&a), Some(vec![b"a".to_vec()]));
        cache.put(c.clone(), vec![]);

        assert!(cache.get(&b).is_none());
        assert!(cache.get(&c).is_some());
        // Same query with another flag is a different entry
        assert!(cache.get(&QueryKey::new(b"a", 1, true)).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hit_count, 2);
        assert_eq!(stats.miss_count, 2);
        assert_eq!(stats.size, 2);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }
}
