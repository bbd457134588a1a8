//! Rules engine error types.

use thiserror::Error;

/// Why terms could not be computed. The engine never guesses around a
/// missing or malformed input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    /// No ceiling table exists for the jurisdiction code.
    #[error("Unknown jurisdiction: {0}")]
    UnknownJurisdiction(String),

    /// A required figure is absent from the verified dataset.
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// A figure is present but unusable.
    #[error("Invalid input {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    /// Fixed-point arithmetic overflowed.
    #[error("Arithmetic overflow computing {0}")]
    Overflow(&'static str),
}
