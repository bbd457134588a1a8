//! Object storage error types for uw-blob.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    /// No object is stored under the key.
    #[error("Blob not found: {0}")]
    NotFound(String),

    /// The store could not be built from configuration.
    #[error("Storage not configured: {0}")]
    Config(String),

    /// Backend failure (network, permissions, I/O).
    #[error("Object store error: {0}")]
    Store(#[from] object_store::Error),
}
