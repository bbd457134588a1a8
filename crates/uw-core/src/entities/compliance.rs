use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::ComplianceSeverity;

/// A finding from the compliance reviewer against one document version.
///
/// Never mutated in place: a regeneration produces a fresh list for the new
/// version and the previous version keeps its own.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ComplianceIssue {
    pub severity: ComplianceSeverity,
    /// Section or clause the finding refers to.
    pub section: String,
    pub description: String,
    pub recommendation: Option<String>,
}

/// Outcome of one deterministic regulatory check (presence, structure, or
/// cross-reference to rules-engine terms).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RegulatoryCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}
