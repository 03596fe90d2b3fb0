//! In-memory cache store.

use super::{CacheCell, CacheStore, ClearPattern};
use crate::reactive::ReactiveCell;
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Configuration for [`MemoryCache`].
#[derive(Clone, Debug)]
pub struct MemoryCacheConfig {
    /// Max number of keys before least-recently-used eviction.
    /// Default: 1000
    pub capacity: usize,

    /// TTL applied when `set` is called without one (None = never expire).
    pub default_ttl: Option<Duration>,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            default_ttl: None,
        }
    }
}

struct Entry {
    cell: CacheCell,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }
}

/// LRU-bounded cache with optional per-key TTL.
///
/// Each key keeps the same cell for as long as it is present, so a reader
/// holding the cell sees later writes. Removed, evicted and expired keys
/// have their cell set to `None` before being dropped.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, Entry>>,
    default_ttl: Option<Duration>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_config(MemoryCacheConfig::default())
    }

    pub fn with_config(config: MemoryCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            default_ttl: config.default_ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Keys currently held, most recently used first.
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Insert or overwrite `key`, keeping its cell when present.
    fn write(&self, key: &str, data: Value, expires_at: Option<Instant>) {
        let (cell, evicted) = {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get_mut(key) {
                entry.expires_at = expires_at;
                (entry.cell.clone(), None)
            } else {
                let cell = ReactiveCell::new(None);
                let evicted = entries.push(
                    key.to_string(),
                    Entry {
                        cell: cell.clone(),
                        expires_at,
                    },
                );
                (cell, evicted.map(|(_, e)| e.cell))
            }
        };
        release(evicted);
        cell.set(Some(data));
    }

    /// Drop every expired key. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let removed: Vec<CacheCell> = {
            let mut entries = self.entries.lock();
            let expired: Vec<String> = entries
                .iter()
                .filter(|(_, e)| e.is_expired(now))
                .map(|(k, _)| k.clone())
                .collect();
            expired
                .iter()
                .filter_map(|k| entries.pop(k))
                .map(|e| e.cell)
                .collect()
        };
        let count = removed.len();
        release(removed);
        count
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Option<CacheCell> {
        let now = Instant::now();
        let expired = {
            let mut entries = self.entries.lock();
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.cell.clone()),
                Some(_) => entries.pop(key).map(|e| e.cell),
            }
        };
        release(expired);
        None
    }

    fn set(&self, key: &str, data: Value, ttl: Option<Duration>) {
        let expires_at = ttl.or(self.default_ttl).map(|ttl| Instant::now() + ttl);
        self.write(key, data, expires_at);
    }

    fn expires_at(&self, key: &str) -> Option<Instant> {
        self.entries.lock().peek(key).and_then(|e| e.expires_at)
    }

    fn restore(&self, key: &str, data: Value, expires_at: Option<Instant>) {
        self.write(key, data, expires_at);
    }

    fn delete(&self, key: &str) {
        let removed = self.entries.lock().pop(key).map(|e| e.cell);
        release(removed);
    }

    fn clear(&self, pattern: Option<&ClearPattern>) {
        let removed: Vec<CacheCell> = {
            let mut entries = self.entries.lock();
            let keys: Vec<String> = entries
                .iter()
                .map(|(k, _)| k)
                .filter(|k| pattern.map_or(true, |p| p.matches(k)))
                .cloned()
                .collect();
            keys.iter()
                .filter_map(|k| entries.pop(k))
                .map(|e| e.cell)
                .collect()
        };
        release(removed);
    }
}

/// Tell readers of dropped keys that the value is gone.
fn release(cells: impl IntoIterator<Item = CacheCell>) {
    for cell in cells {
        cell.set(None);
    }
}
