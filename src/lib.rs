//! # gql-live
//!
//! Client-side core for live GraphQL data: subscriptions streamed over the
//! `graphql-transport-ws` protocol, and mutations applied optimistically to
//! a reactive cache.
//!
//! ## Core Concepts
//!
//! - **Transport**: One connection multiplexing many subscriptions, with
//!   handshake, keepalive, reconnection and resubscription
//! - **Protocol**: The JSON frame envelope and its codec
//! - **Mutations**: Snapshot, apply, commit or roll back speculative writes
//! - **Cache**: Keyed reactive store the mutations write into
//! - **Reactive**: Cells, derived views and batched notifications
//!
//! The transport is sans-IO: the host owns the socket and the clock and
//! forwards events into it.
//!
//! ## Example
//!
//! ```ignore
//! use gql_live::{memory_pair, SubscribeOptions, SubscriptionTransport, TransportConfig};
//!
//! let (connector, _peer) = memory_pair();
//! let transport = SubscriptionTransport::new(TransportConfig::new("ws://localhost/graphql"), connector)?;
//!
//! let handle = transport.subscribe(SubscribeOptions::new(
//!     "subscription OnMessage { newMessage { id text } }",
//! ));
//!
//! // Socket events are tagged with the id the connector was given.
//! let conn = transport.connection_id().unwrap();
//! transport.handle_open(conn, Instant::now());
//! transport.handle_message(conn, Instant::now(), r#"{"type":"connection_ack"}"#);
//!
//! for event in handle.drain_events() {
//!     println!("{event:?}");
//! }
//! ```

pub mod cache;
pub mod error;
pub mod mutations;
pub mod protocol;
pub mod reactive;
pub mod transport;
pub mod types;

// Re-exports
pub use cache::{CacheCell, CacheStore, ClearPattern, MemoryCache, MemoryCacheConfig};
pub use error::{ClientError, Result};
pub use mutations::{
    ConflictResolver, ConflictStrategy, ConflictWinner, CustomResolver, FirstWriteWinsResolver,
    LastWriteWinsResolver, MutationCache, MutationManagerConfig, MutationQueue, MutationRequest,
    MutationResult, MutationStats, MutationStatus, OptimisticMutation, OptimisticMutationManager,
    OptimisticUpdateSnapshot,
};
pub use protocol::{Message, MessageType, SubscribePayload};
pub use reactive::{batch, Derived, ReactiveCell};
pub use transport::memory::{memory_pair, MemoryConnector, MemoryPeer, PeerEvent};
pub use transport::{
    CloseEvent, Connection, ConnectionId, ConnectionParams, Connector, SubscribeOptions,
    SubscriptionEvent, SubscriptionHandle, SubscriptionState, SubscriptionTransport,
    TransportConfig,
};
pub use types::*;
