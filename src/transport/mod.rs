//! Client transport for GraphQL subscriptions.
//!
//! One [`SubscriptionTransport`] owns one duplex connection and multiplexes
//! any number of subscriptions over it:
//! - `connection_init` / `connection_ack` handshake with optional params
//! - Keepalive pings, immediate pongs
//! - Reconnection with exponential backoff, resubscribing everything
//! - Per-subscription reactive state, callbacks and an event channel
//!
//! # Example
//!
//! ```ignore
//! let (connector, peer) = memory_pair();
//! let transport = SubscriptionTransport::new(TransportConfig::new("ws://api/graphql"), connector)?;
//!
//! let handle = transport.subscribe(
//!     SubscribeOptions::new("subscription { newMessage { id text } }")
//!         .on_data(|data| println!("got {data}")),
//! );
//!
//! // Host event loop
//! let conn = transport.connection_id().unwrap();
//! transport.handle_open(conn, Instant::now());
//! transport.handle_message(conn, Instant::now(), r#"{"type":"connection_ack"}"#);
//! if let Some(at) = transport.next_deadline() {
//!     // sleep until `at`, then
//!     transport.tick(at);
//! }
//! ```

mod client;
mod config;
mod connection;
mod handle;
pub mod memory;
mod types;

pub use client::SubscriptionTransport;
pub use config::{ConnectionParams, ConnectionParamsProvider, TransportConfig};
pub use connection::{CloseEvent, Connection, ConnectionId, Connector};
pub use handle::SubscriptionHandle;
pub use types::{
    CompleteCallback, DataCallback, ErrorCallback, SubscribeOptions, SubscriptionEvent,
    SubscriptionState,
};
