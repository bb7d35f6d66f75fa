//! In-memory cache with LRU eviction

use crate::{CacheConfig, CacheResult, CacheStats};
use lru::LruCache;
use parking_lot::Mutex;
use std::{
    hash::Hash,
    num::NonZeroUsize,
    time::{Duration, Instant},
};
use tracing::debug;

/// Entry in the memory cache
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |exp| Instant::now() > exp)
    }
}

/// Bounded cache guarded by a single mutex around the entry map
pub struct Cache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, CacheEntry<V>>>,
    config: CacheConfig,
    stats: Mutex<CacheStats>,
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a new cache with the given configuration
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;

        let entries = match config.get_max_entries().and_then(NonZeroUsize::new) {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };

        Ok(Self {
            entries: Mutex::new(entries),
            config,
            stats: Mutex::new(CacheStats::default()),
        })
    }

    /// Get a value, refreshing its recency. Expired entries count as misses.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                let value = entry.value.clone();
                self.stats.lock().hits += 1;
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
        }
        let mut stats = self.stats.lock();
        stats.misses += 1;
        stats.total_keys = entries.len() as u64;
        None
    }

    /// Insert a value using the configured TTL
    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock();
        let entry = CacheEntry::new(value, *self.config.get_default_ttl());

        let displaced = entries.push(key.clone(), entry);
        let mut stats = self.stats.lock();
        if let Some((old_key, _)) = displaced {
            if old_key != key {
                stats.evictions += 1;
            }
        }
        stats.total_keys = entries.len() as u64;
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// The lock is not held while `compute` runs, so two racing callers may
    /// both compute; the later insert wins.
    pub fn get_or_insert_with<F>(&self, key: K, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = compute();
        self.insert(key, value.clone());
        value
    }

    /// Remove a single entry
    pub fn invalidate(&self, key: &K) -> bool {
        let mut entries = self.entries.lock();
        let removed = entries.pop(key).is_some();

        let mut stats = self.stats.lock();
        if removed {
            stats.invalidations += 1;
        }
        stats.total_keys = entries.len() as u64;
        removed
    }

    /// Remove every entry whose key matches `predicate`
    pub fn invalidate_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&K) -> bool,
    {
        let mut entries = self.entries.lock();
        let doomed: Vec<K> = entries
            .iter()
            .filter(|(key, _)| predicate(key))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            entries.pop(key);
        }

        let mut stats = self.stats.lock();
        stats.invalidations += doomed.len() as u64;
        stats.total_keys = entries.len() as u64;
        debug!(removed = doomed.len(), "Cache entries invalidated");
        doomed.len()
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        let removed = entries.len() as u64;
        entries.clear();

        let mut stats = self.stats.lock();
        stats.invalidations += removed;
        stats.total_keys = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }
}
