//! Priority queue of mutations awaiting execution.

use super::types::OptimisticMutation;
use crate::error::{ClientError, Result};
use crate::types::{MutationId, Timestamp};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Default max queued mutations.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 50;

/// One queued mutation.
#[derive(Clone, Debug)]
pub struct QueuedMutation {
    pub mutation: OptimisticMutation,
    pub priority: i32,
    pub timestamp: Timestamp,
    /// Insertion order, breaks timestamp ties.
    seq: u64,
}

impl PartialEq for QueuedMutation {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedMutation {}

impl PartialOrd for QueuedMutation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedMutation {
    /// Greatest = next out: highest priority, then oldest.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.timestamp.cmp(&self.timestamp))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Bounded queue ordered by descending priority, FIFO within a priority.
#[derive(Debug)]
pub struct MutationQueue {
    heap: BinaryHeap<QueuedMutation>,
    max_size: usize,
    next_seq: u64,
}

impl MutationQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            max_size,
            next_seq: 0,
        }
    }

    pub fn push(&mut self, mutation: OptimisticMutation, priority: i32) -> Result<()> {
        if self.heap.len() >= self.max_size {
            return Err(ClientError::QueueFull { max: self.max_size });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueuedMutation {
            mutation,
            priority,
            timestamp: Timestamp::now(),
            seq,
        });
        Ok(())
    }

    pub fn pop(&mut self) -> Option<QueuedMutation> {
        self.heap.pop()
    }

    pub fn peek(&self) -> Option<&QueuedMutation> {
        self.heap.peek()
    }

    /// Drop a queued mutation. Returns true if it was queued.
    pub fn remove(&mut self, id: MutationId) -> bool {
        let before = self.heap.len();
        self.heap.retain(|entry| entry.mutation.id != id);
        self.heap.len() != before
    }

    pub fn contains(&self, id: MutationId) -> bool {
        self.heap.iter().any(|entry| entry.mutation.id == id)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl Default for MutationQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUEUE_SIZE)
    }
}
