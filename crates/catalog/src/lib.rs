//! PPE catalog: item metadata consumed by the request lifecycle and the Kardex.
//!
//! The catalog is owned by another service. This crate only models what the
//! core reads from it (validity period, criticality tier, category, owning
//! company) and the port through which it is read.

pub mod item;
pub mod service;

pub use item::{CatalogItem, CriticalityTier, EppId, ItemCategory};
pub use service::{CatalogService, InMemoryCatalog};
