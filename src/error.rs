//! Error types for the subscription transport and mutation manager.

use crate::types::{MutationId, SubscriptionId};
use thiserror::Error;

/// Main error type for client operations.
///
/// Cloneable so it can be stored inside reactive state and handed to
/// callbacks without giving up ownership.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ClientError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection acknowledgment not received within {0} ms")]
    ConnectionTimeout(u64),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Subscription {id} error: {message}")]
    Subscription { id: SubscriptionId, message: String },

    #[error("Max reconnection attempts ({attempts}) reached")]
    ReconnectExhausted { attempts: u32 },

    #[error("Mutation failed: {0}")]
    MutationFailed(String),

    #[error("Mutation not found: {0}")]
    MutationNotFound(MutationId),

    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: MutationId,
        from: &'static str,
        to: &'static str,
    },

    #[error("Mutation queue is full ({max} entries)")]
    QueueFull { max: usize },
}

impl ClientError {
    /// Whether this error belongs to the connection rather than one subscription.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            ClientError::Connection(_)
                | ClientError::ConnectionTimeout(_)
                | ClientError::ReconnectExhausted { .. }
        )
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Serialization(e.to_string())
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
