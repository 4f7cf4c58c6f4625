//! Error types for reconciliation and migrations.

use std::path::PathBuf;

/// Errors that can occur while introspecting, diffing or migrating.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// The operation needs a relational backend but the adapter is not one.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Rolling back a migration that has no `down` step.
    #[error("Migration {id} ({name}) has no down migration and cannot be rolled back")]
    MissingDown {
        /// Migration id.
        id: i64,
        /// Migration name.
        name: String,
    },

    /// Database error, passed through untouched.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Failure reported by a non-sqlx adapter.
    #[error("Adapter error: {0}")]
    Adapter(String),

    /// IO error (reading migration directories, writing generated files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a migration file.
    #[error("Failed to parse migration file '{path}': {message}")]
    ParseError {
        /// Path to the migration file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Two migrations share the same numeric id.
    #[error("Duplicate migration id {id}: '{first}' and '{second}'")]
    DuplicateMigration {
        /// The shared id.
        id: i64,
        /// Filename registered first.
        first: String,
        /// Filename registered second.
        second: String,
    },

    /// A tracked or requested migration has no registered implementation.
    #[error("Migration not found: {0}")]
    MigrationNotFound(i64),

    /// Tracking table name that the differ would treat as a model table.
    #[error("Invalid tracking table '{0}': the name must start with '_'")]
    InvalidTrackingTable(String),

    /// Invalid migration state.
    #[error("Invalid migration state: {0}")]
    InvalidState(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
