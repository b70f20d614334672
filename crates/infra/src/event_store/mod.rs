//! Append-only event store boundary.
//!
//! Company-scoped event streams, one per request, with no storage
//! assumptions. Only the in-memory backend lives here.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
