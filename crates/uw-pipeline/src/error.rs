//! Pipeline error types.
//!
//! Verification and compliance findings are data, not errors. What ends up
//! here is either rejected before any state changes (`Validation`,
//! `RateLimited`, `Conflict`, `InvalidTransition`, `NotFound`) or a stage
//! failure that moved the deal to `error`.

use std::time::Duration;

use thiserror::Error;
use uw_blob::BlobError;
use uw_core::enums::OperationClass;
use uw_core::errors::CoreError;
use uw_db::error::{Conflict, DatabaseError};
use uw_llm::LlmError;
use uw_rules::RulesError;

use crate::intake::IntakeError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed input, rejected before any state mutation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Version or status mismatch. Refresh and retry.
    #[error("Conflict: {0}")]
    Conflict(#[from] Conflict),

    #[error("Rate limited: {class} limit reached, retry in {}s", retry_after.as_secs().max(1))]
    RateLimited {
        class: OperationClass,
        retry_after: Duration,
    },

    /// The generative service failed after retries.
    #[error("Provider error: {0}")]
    Provider(#[from] LlmError),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(DatabaseError),

    #[error("Storage error: {0}")]
    Blob(#[from] BlobError),

    #[error("Rules error: {0}")]
    Rules(#[from] RulesError),

    #[error("Intake error: {0}")]
    Intake(#[from] IntakeError),
}

impl PipelineError {
    /// Whether the caller may succeed by refreshing and retrying.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<DatabaseError> for PipelineError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::Conflict(c) => Self::Conflict(c),
            DatabaseError::NoResult => Self::NotFound("no matching record".into()),
            DatabaseError::InvalidState(msg) => Self::Validation(msg),
            other => Self::Database(other),
        }
    }
}

impl From<CoreError> for PipelineError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::NotFound { entity_type, id } => Self::NotFound(format!("{entity_type} {id}")),
            CoreError::InvalidTransition { from, to, .. } => Self::InvalidTransition { from, to },
            CoreError::Validation(msg) => Self::Validation(msg),
            CoreError::Other(e) => Self::Database(DatabaseError::Other(e)),
        }
    }
}
