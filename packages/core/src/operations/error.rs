//! Error types for the tree operations layer
//!
//! This module defines all error types that can occur during tree operations,
//! separating data/programming errors (surfaced directly to the caller) from
//! storage failures (always propagated, never retried here).

use crate::db::{DatabaseError, QueryError};
use thiserror::Error;

/// Errors that can occur during tree operations
///
/// # Examples
///
/// ```rust
/// use arbor_core::operations::TreeError;
///
/// let err = TreeError::location_not_found(42);
/// assert_eq!(err.to_string(), "location 42 not found");
/// ```
#[derive(Error, Debug)]
pub enum TreeError {
    /// A required single-row fetch matched nothing
    ///
    /// Covers locations, trash entries and missing fallback main locations.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// No live location carries the given remote id
    #[error("location with remote id '{0}' not found")]
    RemoteIdNotFound(String),

    /// Stored data contradicts a tree invariant
    ///
    /// For example a swap that cannot locate both of its slots, or a main
    /// location change pointing at a placement of another content item.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Caller misuse, such as moving a node into its own subtree
    #[error("Invalid operation: {reason}")]
    InvalidOperation { reason: String },

    /// Any underlying storage failure
    #[error("Storage failure: {0}")]
    Storage(#[from] DatabaseError),
}

impl TreeError {
    /// Create a NotFound error
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Create a NotFound error for a live location
    pub fn location_not_found(id: i64) -> Self {
        Self::not_found("location", id)
    }

    /// Create a NotFound error for a trash entry
    pub fn trash_entry_not_found(id: i64) -> Self {
        Self::not_found("trash entry", id)
    }

    /// Create an InvariantViolation error
    pub fn invariant_violation(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Create an InvalidOperation error
    pub fn invalid_operation(reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::RemoteIdNotFound(_))
    }
}

impl From<QueryError> for TreeError {
    fn from(error: QueryError) -> Self {
        Self::invalid_operation(error.to_string())
    }
}
