//! In-memory loopback connector.
//!
//! Everything the transport does to its socket is recorded as a
//! [`PeerEvent`] on a channel read by the paired [`MemoryPeer`], which plays
//! the server side: it inspects outbound frames and can make connection
//! attempts or sends fail.
//!
//! The event channel is unbounded and only shrinks when the peer drains it.
//! Use this connector for tests and short-lived embeddings; a long-running
//! host must call [`MemoryPeer::drain`] regularly or use a real socket.

use super::connection::{Connection, ConnectionId, Connector};
use crate::error::{ClientError, Result};
use crate::protocol::{decode, Message};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Something the transport did to the in-memory socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerEvent {
    Connected {
        id: ConnectionId,
        url: String,
        protocol: String,
    },
    Frame(String),
    Closed { code: u16, reason: String },
}

#[derive(Default)]
struct Faults {
    failing_connects: AtomicUsize,
    reject_sends: AtomicBool,
    attempts: AtomicUsize,
}

/// Create a connector and the peer observing it.
pub fn memory_pair() -> (MemoryConnector, MemoryPeer) {
    let (sender, receiver) = unbounded();
    let faults = Arc::new(Faults::default());
    (
        MemoryConnector {
            events: sender,
            faults: faults.clone(),
        },
        MemoryPeer {
            events: receiver,
            faults,
        },
    )
}

pub struct MemoryConnector {
    events: Sender<PeerEvent>,
    faults: Arc<Faults>,
}

impl Connector for MemoryConnector {
    fn connect(
        &mut self,
        id: ConnectionId,
        url: &str,
        protocol: &str,
    ) -> Result<Box<dyn Connection>> {
        self.faults.attempts.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .faults
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ClientError::Connection(format!("connection to {url} refused")));
        }

        let _ = self.events.send(PeerEvent::Connected {
            id,
            url: url.to_string(),
            protocol: protocol.to_string(),
        });
        Ok(Box::new(MemoryConnection {
            events: self.events.clone(),
            faults: self.faults.clone(),
            closed: false,
        }))
    }
}

struct MemoryConnection {
    events: Sender<PeerEvent>,
    faults: Arc<Faults>,
    closed: bool,
}

impl Connection for MemoryConnection {
    fn send(&mut self, frame: &str) -> Result<()> {
        if self.closed || self.faults.reject_sends.load(Ordering::SeqCst) {
            return Err(ClientError::Connection("socket is not writable".to_string()));
        }
        self.events
            .send(PeerEvent::Frame(frame.to_string()))
            .map_err(|_| ClientError::Connection("peer went away".to_string()))
    }

    fn close(&mut self, code: u16, reason: &str) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.events.send(PeerEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }
}

/// Server side of a [`memory_pair`].
pub struct MemoryPeer {
    events: Receiver<PeerEvent>,
    faults: Arc<Faults>,
}

impl MemoryPeer {
    /// Take every event recorded so far.
    pub fn drain(&self) -> Vec<PeerEvent> {
        self.events.try_iter().collect()
    }

    /// Events recorded and not yet drained.
    pub fn pending(&self) -> usize {
        self.events.len()
    }

    /// Take every event and keep the decodable frames.
    pub fn messages(&self) -> Vec<Message> {
        self.drain()
            .into_iter()
            .filter_map(|event| match event {
                PeerEvent::Frame(frame) => decode(&frame).ok(),
                _ => None,
            })
            .collect()
    }

    /// Refuse the next `count` connection attempts.
    pub fn fail_next_connects(&self, count: usize) {
        self.faults.failing_connects.store(count, Ordering::SeqCst);
    }

    /// Make every send on open connections fail.
    pub fn reject_sends(&self, reject: bool) {
        self.faults.reject_sends.store(reject, Ordering::SeqCst);
    }

    /// Number of `connect` calls made so far, refused ones included.
    pub fn connect_attempts(&self) -> usize {
        self.faults.attempts.load(Ordering::SeqCst)
    }
}
