//! Wire envelope for the `graphql-transport-ws` sub-protocol.
//!
//! Frames are JSON text objects `{ id?, type, payload? }`. Frames without
//! an `id` are connection-scoped; frames with one target one subscription.

mod codec;
mod message;

pub use codec::{decode, encode};
pub use message::{Message, MessageType, SubscribePayload, DEFAULT_ERROR_MESSAGE};

/// Sub-protocol identifier negotiated when the connection is opened.
pub const GRAPHQL_TRANSPORT_WS_PROTOCOL: &str = "graphql-transport-ws";

/// Close code for a normal, caller-initiated shutdown.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code used when the server never acknowledged `connection_init`.
pub const CLOSE_INIT_TIMEOUT: u16 = 4408;
