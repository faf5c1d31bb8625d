//! Event Sourcing System
//!
//! - **`event`**: Domain events, metadata and the stored record format with payload upcasting.
//! - **`aggregate`**: The `Aggregate` trait for state reconstruction, with implementations
//!   for route nodes, route segments, terminals and span equipment.
//! - **`store`**: The `EventStore` trait and the in-memory store.
//! - **`file_store`**: A durable JSON-lines store, one file per stream.

pub mod aggregate;
pub mod event;
pub mod file_store;
pub mod store;

pub use aggregate::*;
pub use event::*;
pub use file_store::FileEventStore;
pub use store::{EventStore, InMemoryEventStore};
