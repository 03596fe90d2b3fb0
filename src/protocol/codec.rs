//! Text frame codec.

use super::message::Message;
use crate::error::{ClientError, Result};

/// Serialize a message into a text frame.
pub fn encode(message: &Message) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Parse a text frame. Unknown types and missing fields are protocol errors.
pub fn decode(frame: &str) -> Result<Message> {
    serde_json::from_str(frame).map_err(|e| ClientError::Protocol(format!("malformed frame: {e}")))
}
