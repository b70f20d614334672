//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. In this domain the
/// request code (`EPP-2024-0007`) and the delivery snapshot of a line are value
/// objects: to "change" one, a new value is built, and snapshots in particular
/// are written once and never replaced.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct LineSnapshot {
///     item_name: String,
///     category: ItemCategory,
/// }
///
/// impl ValueObject for LineSnapshot {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
