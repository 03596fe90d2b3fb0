//! Conflict resolution between overlapping mutations.
//!
//! The manager never calls a resolver itself; callers that detect two
//! mutations touching the same state use one to pick which proceeds.

use super::types::OptimisticMutation;
use std::fmt;

/// Picks which of two conflicting mutations proceeds (`None` = neither).
pub trait ConflictResolver: Send + Sync {
    fn resolve<'a>(
        &self,
        first: &'a OptimisticMutation,
        second: &'a OptimisticMutation,
    ) -> Option<&'a OptimisticMutation>;
}

/// The later timestamp wins; ties go to `second`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LastWriteWinsResolver;

impl ConflictResolver for LastWriteWinsResolver {
    fn resolve<'a>(
        &self,
        first: &'a OptimisticMutation,
        second: &'a OptimisticMutation,
    ) -> Option<&'a OptimisticMutation> {
        if second.timestamp >= first.timestamp {
            Some(second)
        } else {
            Some(first)
        }
    }
}

/// The earlier timestamp wins; ties go to `first`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FirstWriteWinsResolver;

impl ConflictResolver for FirstWriteWinsResolver {
    fn resolve<'a>(
        &self,
        first: &'a OptimisticMutation,
        second: &'a OptimisticMutation,
    ) -> Option<&'a OptimisticMutation> {
        if first.timestamp <= second.timestamp {
            Some(first)
        } else {
            Some(second)
        }
    }
}

/// Outcome chosen by a [`CustomResolver`] predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictWinner {
    First,
    Second,
}

type Predicate =
    Box<dyn Fn(&OptimisticMutation, &OptimisticMutation) -> Option<ConflictWinner> + Send + Sync>;

/// Delegates the decision to a caller-supplied predicate.
pub struct CustomResolver {
    predicate: Predicate,
}

impl CustomResolver {
    pub fn new(
        predicate: impl Fn(&OptimisticMutation, &OptimisticMutation) -> Option<ConflictWinner>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            predicate: Box::new(predicate),
        }
    }
}

impl ConflictResolver for CustomResolver {
    fn resolve<'a>(
        &self,
        first: &'a OptimisticMutation,
        second: &'a OptimisticMutation,
    ) -> Option<&'a OptimisticMutation> {
        match (self.predicate)(first, second)? {
            ConflictWinner::First => Some(first),
            ConflictWinner::Second => Some(second),
        }
    }
}

impl fmt::Debug for CustomResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomResolver(..)")
    }
}

/// Which resolver a caller intends to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConflictStrategy {
    #[default]
    LastWriteWins,
    FirstWriteWins,
    /// Supplied by the caller as a [`CustomResolver`].
    Custom,
}

impl ConflictStrategy {
    /// Built-in resolver for this strategy (`None` for `Custom`).
    pub fn resolver(self) -> Option<Box<dyn ConflictResolver>> {
        match self {
            ConflictStrategy::LastWriteWins => Some(Box::new(LastWriteWinsResolver)),
            ConflictStrategy::FirstWriteWins => Some(Box::new(FirstWriteWinsResolver)),
            ConflictStrategy::Custom => None,
        }
    }
}
