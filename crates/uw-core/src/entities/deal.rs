use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{DealStatus, Program};

/// One unit of pipeline work: a loan, a fund report, a syndication.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Deal {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub program: Program,
    /// Two-letter jurisdiction code (e.g. `"NY"`) used for rate ceilings.
    pub jurisdiction: String,
    pub status: DealStatus,
    /// Stage in which the deal failed. Set only while `status == Error`.
    pub error_step: Option<DealStatus>,
    pub error_message: Option<String>,
    /// Reconciled extraction values after human corrections, keyed
    /// `"<source_doc_type>.<field.path>"`.
    pub verified_data: Option<serde_json::Value>,
    /// Rules-engine output computed during `analyzing`.
    pub terms: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete tombstone.
    pub deleted_at: Option<DateTime<Utc>>,
}
