//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Request lines are entities: an exception toggle changes a line's state but
/// not which line it is.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
