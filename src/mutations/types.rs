//! Optimistic mutation records and snapshots.

use super::writer::MutationCache;
use crate::error::ClientError;
use crate::reactive::ReactiveCell;
use crate::types::{MutationId, Query, Timestamp};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Lifecycle of an optimistic mutation.
///
/// `Pending -> Optimistic -> (Completed | Failed -> RolledBack)`.
/// `Completed` and `RolledBack` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MutationStatus {
    Pending,
    Optimistic,
    Completed,
    Failed,
    RolledBack,
}

impl MutationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationStatus::Pending => "pending",
            MutationStatus::Optimistic => "optimistic",
            MutationStatus::Completed => "completed",
            MutationStatus::Failed => "failed",
            MutationStatus::RolledBack => "rolled-back",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MutationStatus::Completed | MutationStatus::RolledBack)
    }

    /// Still waiting on the server.
    pub fn is_in_flight(self) -> bool {
        matches!(self, MutationStatus::Pending | MutationStatus::Optimistic)
    }
}

impl fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response handed to an update function.
#[derive(Clone, Debug, PartialEq)]
pub struct MutationResult {
    pub data: Value,
}

/// Projects a response onto cache keys. Runs once for the optimistic
/// response and again for the confirmed one, so it must overwrite keys
/// rather than append to them.
pub type UpdateFn = Arc<dyn Fn(&mut MutationCache<'_>, &MutationResult) + Send + Sync>;

/// Side effect run after a rollback has restored the cache.
pub type RollbackFn = Arc<dyn Fn(&OptimisticMutation) + Send + Sync>;

/// Everything needed to create an [`OptimisticMutation`].
#[derive(Clone)]
pub struct MutationRequest {
    pub query: Query,
    pub variables: Option<Value>,
    pub optimistic_response: Option<Value>,
    pub update: Option<UpdateFn>,
    pub rollback: Option<RollbackFn>,
    /// Creation time override (None = now).
    pub timestamp: Option<Timestamp>,
}

impl MutationRequest {
    pub fn new(query: impl Into<Query>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            optimistic_response: None,
            update: None,
            rollback: None,
            timestamp: None,
        }
    }

    pub fn variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn optimistic_response(mut self, response: Value) -> Self {
        self.optimistic_response = Some(response);
        self
    }

    pub fn update(
        mut self,
        f: impl Fn(&mut MutationCache<'_>, &MutationResult) + Send + Sync + 'static,
    ) -> Self {
        self.update = Some(Arc::new(f));
        self
    }

    pub fn on_rollback(mut self, f: impl Fn(&OptimisticMutation) + Send + Sync + 'static) -> Self {
        self.rollback = Some(Arc::new(f));
        self
    }

    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A speculative mutation tracked by the manager.
///
/// Clones share `status` and `error`, so a record returned by
/// `create_mutation` keeps reflecting what the manager does with it.
#[derive(Clone)]
pub struct OptimisticMutation {
    pub id: MutationId,
    /// Canonical operation text.
    pub mutation: String,
    pub variables: Option<Value>,
    pub optimistic_response: Option<Value>,
    pub timestamp: Timestamp,
    pub(crate) update: Option<UpdateFn>,
    pub(crate) rollback: Option<RollbackFn>,
    status: ReactiveCell<MutationStatus>,
    error: ReactiveCell<Option<ClientError>>,
}

impl OptimisticMutation {
    pub(crate) fn from_request(id: MutationId, request: MutationRequest) -> Self {
        Self {
            id,
            mutation: request.query.canonicalize(),
            variables: request.variables,
            optimistic_response: request.optimistic_response,
            timestamp: request.timestamp.unwrap_or_else(Timestamp::now),
            update: request.update,
            rollback: request.rollback,
            status: ReactiveCell::new(MutationStatus::Pending),
            error: ReactiveCell::new(None),
        }
    }

    pub fn status(&self) -> MutationStatus {
        self.status.get()
    }

    pub fn status_cell(&self) -> ReactiveCell<MutationStatus> {
        self.status.clone()
    }

    pub fn error(&self) -> Option<ClientError> {
        self.error.get()
    }

    pub fn error_cell(&self) -> ReactiveCell<Option<ClientError>> {
        self.error.clone()
    }

    pub fn has_update(&self) -> bool {
        self.update.is_some()
    }

    /// Whether applying optimistically would do anything.
    pub fn is_optimistic_capable(&self) -> bool {
        self.optimistic_response.is_some() || self.update.is_some()
    }

    pub(crate) fn set_status(&self, status: MutationStatus) {
        self.status.set(status);
    }

    pub(crate) fn set_error(&self, error: Option<ClientError>) {
        self.error.set(error);
    }
}

impl fmt::Debug for OptimisticMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimisticMutation")
            .field("id", &self.id)
            .field("mutation", &self.mutation)
            .field("variables", &self.variables)
            .field("optimistic_response", &self.optimistic_response)
            .field("timestamp", &self.timestamp)
            .field("status", &self.status())
            .field("error", &self.error())
            .finish()
    }
}

/// Cache values a mutation's optimistic write replaced.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimisticUpdateSnapshot {
    pub mutation_id: MutationId,
    /// Key -> value before the first optimistic write (`None` = absent).
    pub previous_values: BTreeMap<String, Option<Value>>,
    /// Key -> expiry the previous value carried. Keys without one never expired.
    pub expirations: BTreeMap<String, Instant>,
}

impl OptimisticUpdateSnapshot {
    pub fn new(mutation_id: MutationId) -> Self {
        Self {
            mutation_id,
            previous_values: BTreeMap::new(),
            expirations: BTreeMap::new(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.previous_values.contains_key(key)
    }

    /// Record `previous` and its expiry for `key` unless the key was
    /// already captured. Returns true if recorded.
    pub fn capture(
        &mut self,
        key: &str,
        previous: Option<Value>,
        expires_at: Option<Instant>,
    ) -> bool {
        if self.contains(key) {
            return false;
        }
        self.previous_values.insert(key.to_string(), previous);
        if let Some(at) = expires_at {
            self.expirations.insert(key.to_string(), at);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.previous_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.previous_values.is_empty()
    }
}

/// Counts of tracked mutations by status.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MutationStats {
    pub total: usize,
    pub pending: usize,
    pub optimistic: usize,
    pub completed: usize,
    pub failed: usize,
    pub rolled_back: usize,
    pub queued: usize,
    pub snapshots: usize,
}
