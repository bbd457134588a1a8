//! CLI response types returned as JSON by `uw` commands.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::entities::{Deal, GeneratedDocument, VerificationIssue};
use crate::enums::DealStatus;

/// Response from `uw run`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PipelineRunResponse {
    pub deal: Deal,
    /// Status the deal was in when the trigger arrived.
    pub started_from: DealStatus,
    pub pending_issues: Vec<VerificationIssue>,
    pub documents: Vec<GeneratedDocument>,
}

/// Response from `uw regenerate`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RegenerateResponse {
    pub document: GeneratedDocument,
    pub needs_review: bool,
}

/// Response from `uw download`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct DownloadResponse {
    pub document_id: String,
    pub version: i64,
    pub storage_key: String,
    /// Presigned URL when the object store supports signing.
    pub url: Option<String>,
    /// Local path the bytes were written to otherwise.
    pub path: Option<String>,
}
