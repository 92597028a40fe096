//! Database Error Types
//!
//! This module defines error types for database operations, providing
//! clear error handling for connection, initialization, and query failures.
//! Driver errors are flattened into context strings so callers never depend
//! on libsql types.

use std::path::PathBuf;
use thiserror::Error;

/// Database operation errors
///
/// Covers connection, initialization, statement execution, and row decoding.
/// Not-found conditions are not database errors; the store returns `Option`
/// and the operations layer decides whether absence is an error.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {reason}")]
    ConnectionFailed { path: PathBuf, reason: String },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// A stored row could not be decoded into a model value
    #[error("Invalid row in '{table}': {reason}")]
    InvalidRow { table: String, reason: String },
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed {
            path,
            reason: source.to_string(),
        }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Create an invalid row error
    pub fn invalid_row(table: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidRow {
            table: table.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<libsql::Error> for DatabaseError {
    fn from(error: libsql::Error) -> Self {
        Self::sql_execution(error.to_string())
    }
}
