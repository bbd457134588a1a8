use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Resolved caller identity for cross-crate passing.
///
/// Produced by whatever authenticates the request; contains only data
/// fields. Every store lookup is scoped by `tenant_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Caller {
    pub tenant_id: String,
    pub actor_id: String,
}

impl Caller {
    #[must_use]
    pub fn new(tenant_id: impl Into<String>, actor_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            actor_id: actor_id.into(),
        }
    }

    /// Rate-limit key for this caller.
    #[must_use]
    pub fn rate_key(&self) -> String {
        format!("{}:{}", self.tenant_id, self.actor_id)
    }
}
