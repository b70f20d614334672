//! Read models built from the request event stream.
//!
//! Projections are rebuildable from the event store, company-isolated, and
//! idempotent under at-least-once delivery.

pub mod requests;

pub use requests::{
    InMemoryRequestsProjection, PpeRequestsProjection, RequestLineRecord, RequestProjectionError, RequestRecord, RequestView,
};
