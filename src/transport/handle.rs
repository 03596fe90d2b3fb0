//! Per-subscription facade.

use super::client::Shared;
use super::types::{SubscriptionEvent, SubscriptionState};
use crate::error::ClientError;
use crate::reactive::{Derived, ReactiveCell};
use crate::types::{ConnectionState, SubscriptionId};
use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use serde_json::Value;
use std::sync::Weak;
use std::time::Duration;

/// Handle to one subscription.
///
/// Reactive views follow the subscription's state; the event channel
/// carries the same updates as discrete events. Dropping the handle does
/// not unsubscribe.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    state: ReactiveCell<SubscriptionState>,
    events: Receiver<SubscriptionEvent>,
    transport: Weak<Shared>,
}

impl SubscriptionHandle {
    pub(crate) fn new(
        id: SubscriptionId,
        state: ReactiveCell<SubscriptionState>,
        events: Receiver<SubscriptionEvent>,
        transport: Weak<Shared>,
    ) -> Self {
        Self {
            id,
            state,
            events,
            transport,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The full state cell.
    pub fn state(&self) -> ReactiveCell<SubscriptionState> {
        self.state.clone()
    }

    pub fn data(&self) -> Derived<SubscriptionState, Option<Value>> {
        self.state.map(|s| s.data.clone())
    }

    pub fn error(&self) -> Derived<SubscriptionState, Option<ClientError>> {
        self.state.map(|s| s.error.clone())
    }

    pub fn active(&self) -> Derived<SubscriptionState, bool> {
        self.state.map(|s| s.active)
    }

    pub fn connection_state(&self) -> Derived<SubscriptionState, ConnectionState> {
        self.state.map(|s| s.connection_state)
    }

    /// Cancel the subscription. Idempotent, and safe after the transport
    /// has been dropped.
    pub fn unsubscribe(&self) {
        match self.transport.upgrade() {
            Some(shared) => shared.unsubscribe(self.id),
            None => self.state.update(|s| s.active = false),
        }
    }

    // --- Events ---

    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<SubscriptionEvent, RecvError> {
        self.events.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<SubscriptionEvent, TryRecvError> {
        self.events.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<SubscriptionEvent, RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }

    /// Take every event already delivered.
    pub fn drain_events(&self) -> Vec<SubscriptionEvent> {
        self.events.try_iter().collect()
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}
