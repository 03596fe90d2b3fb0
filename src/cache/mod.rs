//! Keyed cache of reactive query results.
//!
//! The mutation manager only depends on the [`CacheStore`] trait. The
//! in-memory [`MemoryCache`] keeps one reactive cell per key so readers
//! observe every write, delete and expiry.

mod memory;

pub use memory::{MemoryCache, MemoryCacheConfig};

use crate::reactive::ReactiveCell;
use regex::Regex;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Reactive cell holding one cached result (`None` once removed or expired).
pub type CacheCell = ReactiveCell<Option<Value>>;

/// Key filter for [`CacheStore::clear`].
#[derive(Clone, Debug)]
pub enum ClearPattern {
    /// Keys containing this text.
    Substring(String),
    /// Keys matching this expression.
    Regex(Regex),
}

impl ClearPattern {
    pub fn matches(&self, key: &str) -> bool {
        match self {
            ClearPattern::Substring(text) => key.contains(text.as_str()),
            ClearPattern::Regex(re) => re.is_match(key),
        }
    }
}

impl From<&str> for ClearPattern {
    fn from(text: &str) -> Self {
        ClearPattern::Substring(text.to_string())
    }
}

impl From<Regex> for ClearPattern {
    fn from(re: Regex) -> Self {
        ClearPattern::Regex(re)
    }
}

/// Shared keyed store of reactive query results.
pub trait CacheStore: Send + Sync {
    /// Reactive cell for `key`, or `None` when the key is absent.
    fn get(&self, key: &str) -> Option<CacheCell>;

    /// Write `data` under `key`, expiring after `ttl` when given.
    fn set(&self, key: &str, data: Value, ttl: Option<Duration>);

    fn delete(&self, key: &str);

    /// Remove every key, or only those matching `pattern`.
    fn clear(&self, pattern: Option<&ClearPattern>);

    /// Current value for `key`; `None` means the key is absent.
    fn read(&self, key: &str) -> Option<Value> {
        self.get(key).and_then(|cell| cell.get())
    }

    /// When `key` expires. `None` when it never does or is absent.
    fn expires_at(&self, _key: &str) -> Option<Instant> {
        None
    }

    /// Write `data` expiring exactly at `expires_at` (`None` = never),
    /// ignoring any default TTL. Puts back a value captured earlier.
    fn restore(&self, key: &str, data: Value, expires_at: Option<Instant>) {
        let ttl = expires_at.map(|at| at.saturating_duration_since(Instant::now()));
        self.set(key, data, ttl);
    }
}
