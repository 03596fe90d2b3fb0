//! Cache facade handed to update functions.

use super::manager::OptimisticMutationManager;
use crate::cache::{CacheCell, CacheStore};
use crate::types::MutationId;
use serde_json::Value;
use std::time::Duration;

/// Write access to the cache from inside an update function.
///
/// During an optimistic apply every write first records the key's prior
/// value in the mutation's snapshot, so a later rollback can restore it.
/// During a commit writes go straight through.
pub struct MutationCache<'a> {
    store: &'a dyn CacheStore,
    tracking: Option<(&'a OptimisticMutationManager, MutationId)>,
}

impl<'a> MutationCache<'a> {
    pub(crate) fn tracked(
        store: &'a dyn CacheStore,
        manager: &'a OptimisticMutationManager,
        id: MutationId,
    ) -> Self {
        Self {
            store,
            tracking: Some((manager, id)),
        }
    }

    pub(crate) fn untracked(store: &'a dyn CacheStore) -> Self {
        Self {
            store,
            tracking: None,
        }
    }

    /// Whether writes are being captured for rollback.
    pub fn is_optimistic(&self) -> bool {
        self.tracking.is_some()
    }

    pub fn read(&self, key: &str) -> Option<Value> {
        self.store.read(key)
    }

    pub fn get(&self, key: &str) -> Option<CacheCell> {
        self.store.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.capture(key);
        self.store.set(key, value, None);
    }

    pub fn set_with_ttl(&mut self, key: &str, value: Value, ttl: Duration) {
        self.capture(key);
        self.store.set(key, value, Some(ttl));
    }

    pub fn delete(&mut self, key: &str) {
        self.capture(key);
        self.store.delete(key);
    }

    /// The underlying store. Writes made through it are not captured.
    pub fn store(&self) -> &'a dyn CacheStore {
        self.store
    }

    fn capture(&self, key: &str) {
        if let Some((manager, id)) = self.tracking {
            manager.snapshot_cache_key(id, key, self.store);
        }
    }
}
