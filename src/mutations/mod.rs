//! Optimistic mutations.
//!
//! [`OptimisticMutationManager`] writes a mutation's expected result into a
//! [`CacheStore`](crate::cache::CacheStore) before the server answers, and
//! either confirms it ([`commit`](OptimisticMutationManager::commit)) or
//! undoes it ([`rollback`](OptimisticMutationManager::rollback)). Prior
//! values are captured key by key the first time an update touches them.
//!
//! # Example
//!
//! ```ignore
//! let manager = OptimisticMutationManager::new();
//! let cache = MemoryCache::new();
//!
//! let mutation = manager.create_mutation(
//!     MutationRequest::new("mutation { addMessage(text: \"hi\") { id text } }")
//!         .optimistic_response(json!({"addMessage": {"id": "temp", "text": "hi"}}))
//!         .update(|cache, result| {
//!             cache.set("messages", json!([result.data["addMessage"]]));
//!         }),
//! );
//!
//! manager.apply_optimistic(mutation.id, &cache)?;
//! match send_to_server(&mutation) {
//!     Ok(response) => manager.commit(mutation.id, &cache, response)?,
//!     Err(e) => manager.rollback(mutation.id, &cache, Some(e))?,
//! }
//! ```

mod conflict;
mod manager;
mod queue;
mod types;
mod writer;

pub use conflict::{
    ConflictResolver, ConflictStrategy, ConflictWinner, CustomResolver, FirstWriteWinsResolver,
    LastWriteWinsResolver,
};
pub use manager::{MutationManagerConfig, OptimisticMutationManager, QueueHandler};
pub use queue::{MutationQueue, QueuedMutation, DEFAULT_MAX_QUEUE_SIZE};
pub use types::{
    MutationRequest, MutationResult, MutationStats, MutationStatus, OptimisticMutation,
    OptimisticUpdateSnapshot, RollbackFn, UpdateFn,
};
pub use writer::MutationCache;
