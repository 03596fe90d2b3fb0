//! Optimistic mutation manager.

use super::conflict::ConflictStrategy;
use super::queue::{MutationQueue, DEFAULT_MAX_QUEUE_SIZE};
use super::types::{
    MutationRequest, MutationResult, MutationStats, MutationStatus, OptimisticMutation,
    OptimisticUpdateSnapshot,
};
use super::writer::MutationCache;
use crate::cache::CacheStore;
use crate::error::{ClientError, Result};
use crate::reactive::batch;
use crate::types::MutationId;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration for [`OptimisticMutationManager`].
#[derive(Clone, Debug)]
pub struct MutationManagerConfig {
    /// Restore snapshots on failure. Rollback always restores when a
    /// snapshot exists; this records the intent.
    /// Default: true
    pub auto_rollback: bool,

    /// Hand the next queued mutation to the queue handler whenever a
    /// mutation commits or rolls back.
    /// Default: false
    pub queue_mutations: bool,

    /// Max queued mutations.
    /// Default: 50
    pub max_queue_size: usize,

    /// Resolver the caller intends to use for overlapping mutations.
    pub conflict_resolution: ConflictStrategy,
}

impl Default for MutationManagerConfig {
    fn default() -> Self {
        Self {
            auto_rollback: true,
            queue_mutations: false,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            conflict_resolution: ConflictStrategy::default(),
        }
    }
}

/// Receives the next queued mutation when queue processing runs.
pub type QueueHandler = Arc<dyn Fn(OptimisticMutation) + Send + Sync>;

struct ManagerInner {
    mutations: BTreeMap<MutationId, OptimisticMutation>,
    /// At most one live snapshot per mutation.
    snapshots: HashMap<MutationId, OptimisticUpdateSnapshot>,
    queue: MutationQueue,
    next_id: MutationId,
}

/// Applies speculative writes to a cache and commits or undoes them.
///
/// The manager is transport-agnostic: callers perform the network request
/// and report its outcome through [`commit`](Self::commit) or
/// [`rollback`](Self::rollback). Every apply/commit/rollback writes inside
/// one [`batch`], so observers never see a half-applied mutation.
pub struct OptimisticMutationManager {
    config: MutationManagerConfig,
    inner: Mutex<ManagerInner>,
    queue_handler: RwLock<Option<QueueHandler>>,
}

impl OptimisticMutationManager {
    pub fn new() -> Self {
        Self::with_config(MutationManagerConfig::default())
    }

    pub fn with_config(config: MutationManagerConfig) -> Self {
        let queue = MutationQueue::new(config.max_queue_size);
        Self {
            config,
            inner: Mutex::new(ManagerInner {
                mutations: BTreeMap::new(),
                snapshots: HashMap::new(),
                queue,
                next_id: MutationId(1),
            }),
            queue_handler: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &MutationManagerConfig {
        &self.config
    }

    /// Register a mutation. Does not touch the cache.
    pub fn create_mutation(&self, request: MutationRequest) -> OptimisticMutation {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id = id.next();

        let mutation = OptimisticMutation::from_request(id, request);
        inner.mutations.insert(id, mutation.clone());
        debug!(%id, "mutation created");
        mutation
    }

    pub fn get_mutation(&self, id: MutationId) -> Option<OptimisticMutation> {
        self.inner.lock().mutations.get(&id).cloned()
    }

    fn require(&self, id: MutationId) -> Result<OptimisticMutation> {
        self.get_mutation(id).ok_or(ClientError::MutationNotFound(id))
    }

    // --- Apply / Commit / Rollback ---

    /// Write the optimistic response into `cache`, capturing prior values.
    ///
    /// A mutation with neither an optimistic response nor an update
    /// function is left untouched.
    pub fn apply_optimistic(&self, id: MutationId, cache: &dyn CacheStore) -> Result<()> {
        let mutation = self.require(id)?;
        if !mutation.is_optimistic_capable() {
            debug!(%id, "nothing to apply optimistically");
            return Ok(());
        }

        let status = mutation.status();
        if status != MutationStatus::Pending {
            return Err(ClientError::InvalidTransition {
                id,
                from: status.as_str(),
                to: MutationStatus::Optimistic.as_str(),
            });
        }

        // The snapshot must exist before the update runs so its writes are captured.
        self.inner
            .lock()
            .snapshots
            .insert(id, OptimisticUpdateSnapshot::new(id));

        batch(|| {
            if let Some(update) = &mutation.update {
                let data = mutation.optimistic_response.clone().unwrap_or(Value::Null);
                let mut writer = MutationCache::tracked(cache, self, id);
                update(&mut writer, &MutationResult { data });
            }
            mutation.set_status(MutationStatus::Optimistic);
        });

        debug!(%id, "optimistic update applied");
        Ok(())
    }

    /// Record `key`'s current value in the live snapshot of mutation `id`.
    ///
    /// Only the first capture per key counts. Returns true if recorded;
    /// false when already captured or no snapshot is live.
    pub fn snapshot_cache_key(&self, id: MutationId, key: &str, cache: &dyn CacheStore) -> bool {
        let needs_capture = self
            .inner
            .lock()
            .snapshots
            .get(&id)
            .map_or(false, |snapshot| !snapshot.contains(key));
        if !needs_capture {
            return false;
        }

        // Read outside the lock: the cache may notify listeners.
        let previous = cache.read(key);
        let expires_at = previous.as_ref().and_then(|_| cache.expires_at(key));
        self.inner
            .lock()
            .snapshots
            .get_mut(&id)
            .map_or(false, |snapshot| snapshot.capture(key, previous, expires_at))
    }

    /// Confirm a mutation with the server's `response`.
    pub fn commit(&self, id: MutationId, cache: &dyn CacheStore, response: Value) -> Result<()> {
        let mutation = self.require(id)?;
        let status = mutation.status();
        if !status.is_in_flight() {
            return Err(ClientError::InvalidTransition {
                id,
                from: status.as_str(),
                to: MutationStatus::Completed.as_str(),
            });
        }

        batch(|| {
            if let Some(update) = &mutation.update {
                let mut writer = MutationCache::untracked(cache);
                update(&mut writer, &MutationResult { data: response });
            }
            mutation.set_status(MutationStatus::Completed);
        });
        self.inner.lock().snapshots.remove(&id);

        info!(%id, "mutation committed");
        self.process_queue();
        Ok(())
    }

    /// Fail a mutation and restore every key its optimistic write touched.
    pub fn rollback(
        &self,
        id: MutationId,
        cache: &dyn CacheStore,
        error: Option<ClientError>,
    ) -> Result<()> {
        let mutation = self.require(id)?;
        let status = mutation.status();
        if !status.is_in_flight() {
            return Err(ClientError::InvalidTransition {
                id,
                from: status.as_str(),
                to: MutationStatus::RolledBack.as_str(),
            });
        }

        batch(|| {
            mutation.set_error(error);
            mutation.set_status(MutationStatus::Failed);
        });

        let snapshot = self.inner.lock().snapshots.remove(&id);
        if let Some(snapshot) = snapshot {
            let restored = snapshot.len();
            let OptimisticUpdateSnapshot {
                previous_values,
                expirations,
                ..
            } = snapshot;
            batch(|| {
                for (key, previous) in previous_values {
                    match previous {
                        Some(value) => cache.restore(&key, value, expirations.get(&key).copied()),
                        None => cache.delete(&key),
                    }
                }
                mutation.set_status(MutationStatus::RolledBack);
            });
            warn!(%id, keys = restored, "mutation rolled back");
        } else {
            warn!(%id, "mutation failed with nothing to restore");
        }

        if let Some(on_rollback) = &mutation.rollback {
            on_rollback(&mutation);
        }

        self.process_queue();
        Ok(())
    }

    // --- Queue ---

    /// Queue a mutation for later execution. Returns false when the queue
    /// is full.
    pub fn queue_mutation(&self, mutation: &OptimisticMutation, priority: i32) -> bool {
        match self.inner.lock().queue.push(mutation.clone(), priority) {
            Ok(()) => {
                debug!(id = %mutation.id, priority, "mutation queued");
                true
            }
            Err(e) => {
                warn!(id = %mutation.id, error = %e, "mutation rejected");
                false
            }
        }
    }

    /// Dequeue the highest-priority, oldest queued mutation.
    pub fn get_next_queued_mutation(&self) -> Option<OptimisticMutation> {
        self.inner.lock().queue.pop().map(|entry| entry.mutation)
    }

    /// Look at the next queued mutation without removing it.
    pub fn peek_next_queued_mutation(&self) -> Option<OptimisticMutation> {
        self.inner
            .lock()
            .queue
            .peek()
            .map(|entry| entry.mutation.clone())
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Install the handler that receives dequeued mutations when queue
    /// processing runs. Without one, mutations stay queued for
    /// [`get_next_queued_mutation`](Self::get_next_queued_mutation).
    pub fn set_queue_handler(&self, handler: impl Fn(OptimisticMutation) + Send + Sync + 'static) {
        *self.queue_handler.write() = Some(Arc::new(handler));
    }

    fn process_queue(&self) {
        if !self.config.queue_mutations {
            return;
        }
        let Some(handler) = self.queue_handler.read().clone() else {
            return;
        };
        if let Some(next) = self.get_next_queued_mutation() {
            debug!(id = %next.id, "dispatching queued mutation");
            handler(next);
        }
    }

    // --- Introspection / housekeeping ---

    pub fn snapshot(&self, id: MutationId) -> Option<OptimisticUpdateSnapshot> {
        self.inner.lock().snapshots.get(&id).cloned()
    }

    pub fn has_snapshot(&self, id: MutationId) -> bool {
        self.inner.lock().snapshots.contains_key(&id)
    }

    /// Mutations still waiting on the server, oldest first.
    pub fn pending_mutations(&self) -> Vec<OptimisticMutation> {
        self.inner
            .lock()
            .mutations
            .values()
            .filter(|m| m.status().is_in_flight())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().mutations.is_empty()
    }

    pub fn stats(&self) -> MutationStats {
        let inner = self.inner.lock();
        let mut stats = MutationStats {
            total: inner.mutations.len(),
            queued: inner.queue.len(),
            snapshots: inner.snapshots.len(),
            ..Default::default()
        };
        for mutation in inner.mutations.values() {
            match mutation.status() {
                MutationStatus::Pending => stats.pending += 1,
                MutationStatus::Optimistic => stats.optimistic += 1,
                MutationStatus::Completed => stats.completed += 1,
                MutationStatus::Failed => stats.failed += 1,
                MutationStatus::RolledBack => stats.rolled_back += 1,
            }
        }
        stats
    }

    /// Forget mutations in a terminal state. Returns how many were removed.
    pub fn clear_completed(&self) -> usize {
        let mut inner = self.inner.lock();
        let done: Vec<MutationId> = inner
            .mutations
            .values()
            .filter(|m| m.status().is_terminal())
            .map(|m| m.id)
            .collect();
        for id in &done {
            inner.mutations.remove(id);
            inner.snapshots.remove(id);
        }
        done.len()
    }

    /// Forget every mutation, snapshot and queued entry. The cache is not
    /// touched.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.mutations.clear();
        inner.snapshots.clear();
        inner.queue.clear();
    }
}

impl Default for OptimisticMutationManager {
    fn default() -> Self {
        Self::new()
    }
}
