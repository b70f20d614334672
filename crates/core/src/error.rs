//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// lifecycle rules, tenant boundaries). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (no lines, non-positive quantity, empty update).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A request, line or catalog item does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The target state is not reachable from the current state.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// An edit or delete was attempted outside the states that permit it.
    #[error("immutable state: {0}")]
    ImmutableState(String),

    /// A referenced resource belongs to a different company.
    #[error("cross-tenant access: {0}")]
    CrossTenant(String),

    /// A domain invariant was violated (e.g. command addressed to the wrong aggregate).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_transition(from: impl core::fmt::Display, to: impl core::fmt::Display) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn immutable(msg: impl Into<String>) -> Self {
        Self::ImmutableState(msg.into())
    }

    pub fn cross_tenant(msg: impl Into<String>) -> Self {
        Self::CrossTenant(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
