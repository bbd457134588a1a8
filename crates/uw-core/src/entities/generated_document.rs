use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::entities::{ComplianceIssue, RegulatoryCheck, VerificationIssue};
use crate::enums::{ComplianceStatus, DocumentStatus, GeneratedDocType, VerificationStatus};

/// Current state of one generated artifact.
///
/// `version` starts at 1 and only ever increases; each increment replaces
/// `storage_key` and appends a [`DocumentVersion`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct GeneratedDocument {
    pub id: String,
    pub deal_id: String,
    pub tenant_id: String,
    pub doc_type: GeneratedDocType,
    pub storage_key: String,
    pub version: i64,
    pub status: DocumentStatus,
    /// Status to restore if a regeneration fails. Set only while
    /// `status == Regenerating`.
    pub prior_status: Option<DocumentStatus>,
    pub compliance_status: ComplianceStatus,
    pub compliance_issues: Vec<ComplianceIssue>,
    pub regulatory_checks: Vec<RegulatoryCheck>,
    pub verification_status: VerificationStatus,
    pub verification_issues: Vec<VerificationIssue>,
    /// Revise/resubmit cycles used to produce this version.
    pub review_cycles: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable historical record of one document version.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct DocumentVersion {
    pub document_id: String,
    pub version: i64,
    pub storage_key: String,
    pub compliance_status: ComplianceStatus,
    pub compliance_issues: Vec<ComplianceIssue>,
    pub regulatory_checks: Vec<RegulatoryCheck>,
    pub verification_status: VerificationStatus,
    pub verification_issues: Vec<VerificationIssue>,
    pub review_cycles: u32,
    /// Human feedback that drove this version, if any.
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}
