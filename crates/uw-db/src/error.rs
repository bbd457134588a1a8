//! Database error types for uw-db.

use thiserror::Error;

/// Why a compare-and-swap update affected zero rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Conflict {
    /// The caller's version token is stale. Refresh and retry.
    #[error("version mismatch: expected {expected}, current {current}")]
    VersionMismatch { expected: i64, current: i64 },

    /// Another regeneration holds the document. Retry later.
    #[error("a regeneration is already in flight")]
    InFlight,

    /// The deal left the expected status before the update landed.
    #[error("status changed: expected {expected}, current {current}")]
    StatusChanged { expected: String, current: String },
}

/// Errors from database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A SQL query failed or returned malformed data.
    #[error("Query failed: {0}")]
    Query(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Expected a result row but none was returned.
    #[error("No result returned")]
    NoResult,

    /// Operation not permitted in the entity's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Optimistic concurrency check failed.
    #[error("Conflict: {0}")]
    Conflict(#[from] Conflict),

    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
