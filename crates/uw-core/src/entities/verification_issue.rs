use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{CheckType, ResolutionStatus, Severity};

/// A discrepancy found by the verification engine.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct VerificationIssue {
    pub id: String,
    pub deal_id: String,
    pub check_type: CheckType,
    pub field_path: String,
    pub expected: String,
    pub actual: String,
    pub severity: Severity,
    pub status: ResolutionStatus,
    /// Formula or comparison used by the check.
    pub detail: String,
    /// Replacement value supplied when resolved as `corrected`.
    pub corrected_value: Option<String>,
    pub resolution_note: Option<String>,
    pub resolved_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl VerificationIssue {
    /// A pending issue that keeps the deal from leaving verification.
    #[must_use]
    pub fn is_blocking(&self, require_warn_resolution: bool) -> bool {
        if self.status != ResolutionStatus::Pending {
            return false;
        }
        match self.severity {
            Severity::Fail => true,
            Severity::Warn => require_warn_resolution,
            Severity::Info => false,
        }
    }
}

/// An issue as produced by the engine, before it is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct NewVerificationIssue {
    pub check_type: CheckType,
    pub field_path: String,
    pub expected: String,
    pub actual: String,
    pub severity: Severity,
    pub detail: String,
}
