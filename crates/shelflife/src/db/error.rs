//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Receipt '{id}' not found")]
    NotFound { id: String },

    /// A status update found the receipt in a different state than expected.
    #[error("Receipt '{id}' is not in status '{expected}'")]
    StaleStatus { id: String, expected: String },

    /// The requested move is not an edge of the processing state machine.
    #[error("Illegal status transition {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    /// A stored value could not be decoded into its domain type.
    #[error("Invalid value in column '{column}': {reason}")]
    InvalidRow { column: &'static str, reason: String },
}
