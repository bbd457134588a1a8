//! Typed audit detail payloads.
//!
//! Each audit action can carry a structured `detail` JSON blob. These types
//! provide schema validation for the most common detail shapes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Detail for `AuditAction::StatusChanged`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct StatusChangedDetail {
    pub from: String,
    pub to: String,
    pub reason: Option<String>,
}

/// Detail for `AuditAction::PipelineFailed`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PipelineFailedDetail {
    pub step: String,
    pub message: String,
}

/// Detail for `AuditAction::IssueResolved`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct IssueResolvedDetail {
    pub resolution: String,
    pub corrected_value: Option<String>,
    pub note: Option<String>,
}

/// Detail for `AuditAction::DocumentGenerated` and
/// `AuditAction::DocumentRegenerated`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct DocumentVersionDetail {
    pub doc_type: String,
    pub version: i64,
    pub review_cycles: u32,
    pub needs_review: bool,
}

/// Detail for `AuditAction::RegenerationConflict` and
/// `AuditAction::RegenerationRolledBack`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RegenerationDetail {
    pub expected_version: Option<i64>,
    pub reason: String,
}
