//! Append-only event store boundary.
//!
//! Streams are keyed by tenant and aggregate. The store is the source of truth:
//! every read model in this crate can be rebuilt from it.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
