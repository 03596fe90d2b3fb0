//! Reactive cells consumed by the transport and the mutation manager.
//!
//! This is the minimal interface the client core depends on:
//! - [`ReactiveCell`]: a shared, mutable value with change listeners
//! - [`Derived`]: a read-only projection of a cell
//! - [`batch`]: groups several writes into one notification cycle
//!
//! # Example
//!
//! ```ignore
//! let first = ReactiveCell::new(1);
//! let second = ReactiveCell::new(2);
//!
//! first.subscribe(|| println!("first changed"));
//!
//! // Listeners run once, after both writes are visible.
//! batch(|| {
//!     first.set(10);
//!     second.set(20);
//! });
//! ```

mod batch;
mod cell;

pub use batch::{batch, is_batching};
pub use cell::{Derived, Listener, ListenerId, ReactiveCell};
