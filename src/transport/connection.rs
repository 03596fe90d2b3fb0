//! Seams between the transport and the socket implementation.

use crate::error::Result;
use crate::protocol::CLOSE_NORMAL;
use std::fmt;

/// Identity of one physical connection opened by a transport.
///
/// Assigned before `Connector::connect` is called. The host tags every
/// socket event with it so events from a replaced socket are ignored.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One open duplex text connection.
pub trait Connection: Send {
    /// Send one text frame.
    fn send(&mut self, frame: &str) -> Result<()>;

    /// Close the connection. The transport never uses it afterwards.
    fn close(&mut self, code: u16, reason: &str);
}

/// Opens connections for a transport.
///
/// Opening is asynchronous from the transport's point of view: the host
/// reports completion through `handle_open`, failure through
/// `handle_error`/`handle_close`, each tagged with the `id` passed here.
pub trait Connector: Send {
    fn connect(
        &mut self,
        id: ConnectionId,
        url: &str,
        protocol: &str,
    ) -> Result<Box<dyn Connection>>;
}

/// Close notification forwarded by the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
}

impl CloseEvent {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// A normal closure (code 1000).
    pub fn normal() -> Self {
        Self::new(CLOSE_NORMAL, "Normal Closure")
    }

    /// An abnormal closure without a close frame (code 1006).
    pub fn abnormal() -> Self {
        Self::new(1006, "Abnormal Closure")
    }

    pub fn is_clean(&self) -> bool {
        self.code == CLOSE_NORMAL
    }
}
