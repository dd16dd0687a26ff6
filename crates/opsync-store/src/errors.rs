//! Error types for the persistence layer.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error (recurrence rule columns).
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// Requested task was not found.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// Requested checklist item was not found.
    #[error("checklist item not found: {0}")]
    ChecklistItemNotFound(String),

    /// A unique constraint rejected the insert.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
}

impl StoreError {
    /// Whether an underlying `SQLite` error is a unique-constraint violation.
    ///
    /// The unique index is the authoritative duplicate signal for both the
    /// completion ledger and occurrence materialization; callers classify
    /// this case as a duplicate, not a failure.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::UniqueViolation(_) => true,
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
