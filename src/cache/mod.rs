//! Bounded least-recently-used cache
//!
//! One generic [`LruCache`] backs every cache in the engine: decoded video
//! units, decoded audio units, media info, and the reader pool's open
//! handles. Only the configured `max` and the value type differ.
//!
//! Recency is tracked with a monotonically increasing access counter rather
//! than wall-clock time. Every insert and every `get` hit stamps the entry
//! with the current counter and advances it, so counters are unique and the
//! entry with the smallest counter is always the eviction victim. `contains`
//! is a pure lookup and leaves recency untouched.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

pub mod key;

pub use key::{CacheKey, CacheKind};

/// Default capacity when none is configured
pub const DEFAULT_MAX: usize = 10_000;

/// Cache capacities for the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Decoded video units
    pub video_max: usize,

    /// Decoded audio units (one-second chunks)
    pub audio_max: usize,

    /// Media info entries
    pub info_max: usize,

    /// Open readers in the reader pool
    pub reader_max: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            video_max: DEFAULT_MAX,
            audio_max: DEFAULT_MAX,
            info_max: DEFAULT_MAX,
            reader_max: 16,
        }
    }
}

impl CacheConfig {
    /// Performance preset with more open readers
    pub fn performance() -> Self {
        Self {
            video_max: 20_000,
            audio_max: 20_000,
            info_max: DEFAULT_MAX,
            reader_max: 32,
        }
    }

    /// Low memory preset
    pub fn low_memory() -> Self {
        Self {
            video_max: 240,
            audio_max: 30,
            info_max: 1_000,
            reader_max: 4,
        }
    }

    /// Scrubbing optimized preset: wide video window, few readers
    pub fn scrubbing() -> Self {
        Self {
            video_max: 15_000,
            audio_max: 120,
            info_max: DEFAULT_MAX,
            reader_max: 8,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStatistics {
    /// Resident entries
    pub entries: usize,

    /// Sum of entry sizes
    pub total_size: usize,

    /// Configured maximum total size
    pub max: usize,

    /// `get` hits
    pub hit_count: u64,

    /// `get` misses
    pub miss_count: u64,

    /// Entries removed by the eviction policy
    pub eviction_count: u64,
}

impl CacheStatistics {
    /// Total accesses
    pub fn total_accesses(&self) -> u64 {
        self.hit_count + self.miss_count
    }

    /// Hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_accesses();
        if total == 0 {
            return 0.0;
        }
        self.hit_count as f64 / total as f64
    }
}

struct CacheEntry<V> {
    value: V,
    size: usize,
    access: u64,
}

struct Inner<K, V> {
    max: usize,
    size: usize,
    counter: u64,
    entries: HashMap<K, CacheEntry<V>>,
    /// access counter -> key, oldest first
    order: BTreeMap<u64, K>,
}

impl<K: Hash + Eq + Clone, V> Inner<K, V> {
    fn touch(&mut self, key: &K) -> Option<&CacheEntry<V>> {
        let counter = self.counter;
        let entry = self.entries.get_mut(key)?;
        self.order.remove(&entry.access);
        entry.access = counter;
        self.order.insert(counter, key.clone());
        self.counter += 1;
        self.entries.get(key)
    }

    fn remove(&mut self, key: &K) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.access);
        self.size -= entry.size;
        Some(entry)
    }

    /// Evict oldest entries until the total size fits, never evicting `keep`
    fn evict(&mut self, keep: Option<&K>) -> Vec<(K, V)> {
        let mut evicted = Vec::new();
        while self.size > self.max {
            let victim = self
                .order
                .values()
                .find(|k| Some(*k) != keep)
                .cloned();
            let Some(victim) = victim else { break };
            if let Some(entry) = self.remove(&victim) {
                evicted.push((victim, entry.value));
            }
        }
        evicted
    }
}

/// Thread-safe bounded LRU cache.
///
/// All mutation happens under one internal lock owned by this cache
/// instance. Values are handed out by clone, so payloads should be cheap to
/// clone (typically `Arc<T>`); once published they are never mutated in
/// place.
pub struct LruCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K: Hash + Eq + Clone, V: Clone> LruCache<K, V> {
    /// Create a cache holding at most `max` units of size
    pub fn new(max: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                max,
                size: 0,
                counter: 0,
                entries: HashMap::new(),
                order: BTreeMap::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn max(&self) -> usize {
        self.inner.lock().max
    }

    /// Set the capacity, evicting least-recently-used entries until the
    /// cache fits. Returns the evicted pairs.
    pub fn set_max(&self, max: usize) -> Vec<(K, V)> {
        let evicted = {
            let mut inner = self.inner.lock();
            inner.max = max;
            inner.evict(None)
        };
        if !evicted.is_empty() {
            log::debug!("LruCache::set_max({}) evicted {} entries", max, evicted.len());
        }
        self.record_evictions(&evicted);
        evicted
    }

    /// Number of resident entries
    pub fn count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Sum of resident entry sizes
    pub fn size(&self) -> usize {
        self.inner.lock().size
    }

    /// Fill level, 0.0 - 100.0
    pub fn percentage(&self) -> f32 {
        let inner = self.inner.lock();
        if inner.max == 0 {
            return 0.0;
        }
        inner.size as f32 * 100.0 / inner.max as f32
    }

    /// Pure lookup; does not affect recency or statistics
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Look up `key`, refreshing its recency on a hit
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.inner.lock().touch(key).map(|e| e.value.clone());
        match value {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        value
    }

    /// Insert or overwrite with size 1. Returns evicted pairs.
    pub fn add(&self, key: K, value: V) -> Vec<(K, V)> {
        self.add_sized(key, value, 1)
    }

    /// Insert or overwrite with an explicit size. The insert counts as an
    /// access; if the cache is over capacity afterwards the
    /// least-recently-used entries other than `key` are evicted. With a
    /// capacity smaller than `size` the new entry itself does not stay
    /// resident and is returned with the evictions.
    pub fn add_sized(&self, key: K, value: V, size: usize) -> Vec<(K, V)> {
        let evicted = {
            let mut inner = self.inner.lock();
            inner.remove(&key);
            let access = inner.counter;
            inner.counter += 1;
            inner.size += size;
            inner.order.insert(access, key.clone());
            inner.entries.insert(key.clone(), CacheEntry { value, size, access });
            let mut evicted = inner.evict(Some(&key));
            if inner.size > inner.max {
                if let Some(entry) = inner.remove(&key) {
                    evicted.push((key, entry.value));
                }
            }
            evicted
        };
        self.record_evictions(&evicted);
        evicted
    }

    /// Remove an entry explicitly
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().remove(key).map(|e| e.value)
    }

    /// Remove every entry
    pub fn clear(&self) -> Vec<(K, V)> {
        let mut inner = self.inner.lock();
        inner.order.clear();
        inner.size = 0;
        inner.entries.drain().map(|(k, e)| (k, e.value)).collect()
    }

    /// Keys from least to most recently used
    pub fn keys(&self) -> Vec<K> {
        self.inner.lock().order.values().cloned().collect()
    }

    /// Values from least to most recently used
    pub fn values(&self) -> Vec<V> {
        let inner = self.inner.lock();
        inner
            .order
            .values()
            .filter_map(|k| inner.entries.get(k).map(|e| e.value.clone()))
            .collect()
    }

    /// Get statistics
    pub fn statistics(&self) -> CacheStatistics {
        let inner = self.inner.lock();
        CacheStatistics {
            entries: inner.entries.len(),
            total_size: inner.size,
            max: inner.max,
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
            eviction_count: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn record_evictions(&self, evicted: &[(K, V)]) {
        if !evicted.is_empty() {
            self.evictions
                .fetch_add(evicted.len() as u64, Ordering::Relaxed);
        }
    }
}

impl<K: Hash + Eq + Clone, V: Clone> Default for LruCache<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_after_write() {
        let cache = LruCache::new(4);
        cache.add("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        cache.add("a", 2);
        assert_eq!(cache.get(&"a"), Some(2));
        assert_eq!(cache.count(), 1);
    }

    #[test]
    fn test_capacity_two_evicts_oldest() {
        let cache = LruCache::new(2);
        cache.add("A", 1);
        cache.add("B", 2);
        let evicted = cache.add("C", 3);

        assert_eq!(evicted, vec![("A", 1)]);
        assert!(!cache.contains(&"A"));
        assert!(cache.contains(&"B"));
        assert!(cache.contains(&"C"));
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache = LruCache::new(3);
        cache.add(1, "one");
        cache.add(2, "two");
        cache.add(3, "three");

        // 1 becomes most recent, so 2 is the next victim
        assert_eq!(cache.get(&1), Some("one"));
        let evicted = cache.add(4, "four");
        assert_eq!(evicted, vec![(2, "two")]);
        assert!(cache.contains(&1));
        assert_eq!(cache.keys(), vec![3, 1, 4]);
    }

    #[test]
    fn test_contains_does_not_refresh() {
        let cache = LruCache::new(2);
        cache.add(1, ());
        cache.add(2, ());
        assert!(cache.contains(&1));
        cache.add(3, ());
        assert!(!cache.contains(&1));
        assert_eq!(cache.statistics().total_accesses(), 0);
    }

    #[test]
    fn test_overwrite_refreshes_recency() {
        let cache = LruCache::new(2);
        cache.add(1, 10);
        cache.add(2, 20);
        cache.add(1, 11);
        cache.add(3, 30);
        assert_eq!(cache.keys(), vec![1, 3]);
        assert_eq!(cache.values(), vec![11, 30]);
    }

    #[test]
    fn test_set_max_evicts_immediately() {
        let cache = LruCache::new(10);
        for i in 0..5 {
            cache.add(i, i * 10);
        }
        let evicted = cache.set_max(2);
        assert_eq!(evicted, vec![(0, 0), (1, 10), (2, 20)]);
        assert_eq!(cache.keys(), vec![3, 4]);
        assert_eq!(cache.max(), 2);
        assert_eq!(cache.statistics().eviction_count, 3);
    }

    #[test]
    fn test_sized_entries() {
        let cache = LruCache::new(100);
        cache.add_sized("a", (), 40);
        cache.add_sized("b", (), 40);
        let evicted = cache.add_sized("c", (), 40);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].0, "a");
        assert_eq!(cache.size(), 80);
        assert_eq!(cache.percentage(), 80.0);

        // Larger than the whole cache: evicts the rest, then itself
        let evicted = cache.add_sized("huge", (), 500);
        assert_eq!(evicted.len(), 3);
        assert!(cache.is_empty());
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_zero_max_holds_nothing() {
        let cache = LruCache::new(0);
        let evicted = cache.add("a", 1);
        assert_eq!(evicted, vec![("a", 1)]);
        assert!(!cache.contains(&"a"));
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = LruCache::new(10);
        cache.add(1, 1);
        cache.add(2, 2);
        assert_eq!(cache.remove(&1), Some(1));
        assert_eq!(cache.remove(&1), None);
        assert_eq!(cache.clear().len(), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.size(), 0);
        assert!(cache.keys().is_empty());
    }

    #[test]
    fn test_statistics() {
        let cache = LruCache::new(10);
        cache.add(0, ());
        cache.get(&0); // Hit
        cache.get(&1); // Miss

        let stats = cache.statistics();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;

        let cache = Arc::new(LruCache::new(64));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        cache.add((t, i), Arc::new(i));
                        let _ = cache.get(&(t, i / 2));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.count(), 64);
        assert_eq!(cache.size(), 64);
    }

    #[test]
    fn test_config_presets() {
        let config = CacheConfig::default();
        assert_eq!(config.video_max, DEFAULT_MAX);
        assert!(CacheConfig::low_memory().reader_max < config.reader_max);
        assert!(CacheConfig::performance().reader_max > config.reader_max);
    }
}
