//! Core types shared by the transport and the mutation manager.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for a subscription within one transport.
///
/// Rendered as its decimal value in the `id` field of wire frames.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    /// Parse the `id` field of an inbound frame.
    pub fn parse(wire: &str) -> Option<Self> {
        wire.parse().ok().map(SubscriptionId)
    }

    pub fn to_wire(self) -> String {
        self.0.to_string()
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique, monotonically assigned identifier for an optimistic mutation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MutationId(pub u64);

impl MutationId {
    pub fn next(self) -> Self {
        MutationId(self.0 + 1)
    }
}

impl fmt::Debug for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MutationId({})", self.0)
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mutation-{}", self.0)
    }
}

/// Milliseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        Timestamp(millis)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// State of the physical connection owned by a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed GraphQL document produced by an external parser.
///
/// Only printing is needed here; validation belongs to the parser.
pub trait GraphqlDocument: Send + Sync {
    /// Print the document in its canonical source form.
    fn print(&self) -> String;

    /// Name of the operation the document defines, when it has one.
    fn operation_name(&self) -> Option<String> {
        None
    }
}

/// A GraphQL operation supplied either as raw text or as a parsed document.
#[derive(Clone)]
pub enum Query {
    Text(String),
    Document(Arc<dyn GraphqlDocument>),
}

impl Query {
    /// Canonical wire string for this operation.
    ///
    /// Raw text is trimmed; documents are printed.
    pub fn canonicalize(&self) -> String {
        match self {
            Query::Text(text) => text.trim().to_string(),
            Query::Document(doc) => doc.print().trim().to_string(),
        }
    }

    pub fn operation_name(&self) -> Option<String> {
        match self {
            Query::Text(_) => None,
            Query::Document(doc) => doc.operation_name(),
        }
    }

    pub fn document(doc: impl GraphqlDocument + 'static) -> Self {
        Query::Document(Arc::new(doc))
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Query::Document(doc) => f.debug_tuple("Document").field(&doc.print()).finish(),
        }
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::Text(text.to_string())
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::Text(text)
    }
}
