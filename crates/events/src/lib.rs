//! Domain events and their distribution.
//!
//! Request aggregates emit typed events; infrastructure wraps them in
//! company-scoped envelopes, persists them, and fans them out over a bus to
//! read-only consumers (record-set projection, document generation).

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
