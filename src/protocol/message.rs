//! Protocol message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Message used when a server error frame carries no readable message.
pub const DEFAULT_ERROR_MESSAGE: &str = "Subscription error";

/// Payload of a `subscribe` frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscribePayload {
    pub query: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,

    #[serde(
        default,
        rename = "operationName",
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_name: Option<String>,
}

/// One protocol frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    // --- Connection-scoped ---
    ConnectionInit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    ConnectionAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },

    // --- Subscription-scoped ---
    Subscribe {
        id: String,
        payload: SubscribePayload,
    },
    Next {
        id: String,
        payload: Value,
    },
    /// Accepts both `{ message }` and a GraphQL error list as payload.
    Error {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Complete {
        id: String,
    },
}

impl Message {
    pub fn init(payload: Option<Value>) -> Self {
        Message::ConnectionInit { payload }
    }

    pub fn ping() -> Self {
        Message::Ping { payload: None }
    }

    pub fn pong() -> Self {
        Message::Pong { payload: None }
    }

    pub fn subscribe(id: impl Into<String>, payload: SubscribePayload) -> Self {
        Message::Subscribe {
            id: id.into(),
            payload,
        }
    }

    pub fn complete(id: impl Into<String>) -> Self {
        Message::Complete { id: id.into() }
    }

    /// Target subscription id, if this frame is subscription-scoped.
    pub fn id(&self) -> Option<&str> {
        match self {
            Message::Subscribe { id, .. }
            | Message::Next { id, .. }
            | Message::Error { id, .. }
            | Message::Complete { id } => Some(id),
            _ => None,
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Message::ConnectionInit { .. } => MessageType::ConnectionInit,
            Message::ConnectionAck { .. } => MessageType::ConnectionAck,
            Message::Ping { .. } => MessageType::Ping,
            Message::Pong { .. } => MessageType::Pong,
            Message::Subscribe { .. } => MessageType::Subscribe,
            Message::Next { .. } => MessageType::Next,
            Message::Error { .. } => MessageType::Error,
            Message::Complete { .. } => MessageType::Complete,
        }
    }

    /// `data` of a `next` payload (null when absent).
    pub fn next_data(payload: &Value) -> Value {
        payload.get("data").cloned().unwrap_or(Value::Null)
    }

    /// Human-readable message of an `error` payload.
    pub fn error_message(payload: Option<&Value>) -> String {
        let message = match payload {
            Some(Value::Object(map)) => map.get("message").and_then(Value::as_str),
            Some(Value::Array(errors)) => errors
                .first()
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str),
            Some(Value::String(text)) => Some(text.as_str()),
            _ => None,
        };
        message.unwrap_or(DEFAULT_ERROR_MESSAGE).to_string()
    }
}

/// Frame kinds, as carried in the `type` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    ConnectionInit,
    ConnectionAck,
    Ping,
    Pong,
    Subscribe,
    Next,
    Error,
    Complete,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::ConnectionInit => "connection_init",
            MessageType::ConnectionAck => "connection_ack",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
            MessageType::Subscribe => "subscribe",
            MessageType::Next => "next",
            MessageType::Error => "error",
            MessageType::Complete => "complete",
        }
    }

    /// Whether frames of this kind must carry an `id`.
    pub fn requires_id(self) -> bool {
        matches!(
            self,
            MessageType::Subscribe | MessageType::Next | MessageType::Error | MessageType::Complete
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
