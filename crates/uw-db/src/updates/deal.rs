//! Deal update builder.

use serde::Serialize;
use uw_core::enums::Program;

#[derive(Debug, Clone, Default, Serialize)]
pub struct DealUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<Program>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_data: Option<Option<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms: Option<Option<serde_json::Value>>,
}

impl DealUpdate {
    /// Whether the update only touches fields the user edit path may change.
    #[must_use]
    pub const fn is_user_editable(&self) -> bool {
        self.verified_data.is_none() && self.terms.is_none()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.program.is_none()
            && self.jurisdiction.is_none()
            && self.verified_data.is_none()
            && self.terms.is_none()
    }
}

pub struct DealUpdateBuilder(DealUpdate);

impl DealUpdateBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self(DealUpdate::default())
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.0.name = Some(name.into());
        self
    }

    #[must_use]
    pub const fn program(mut self, program: Program) -> Self {
        self.0.program = Some(program);
        self
    }

    #[must_use]
    pub fn jurisdiction(mut self, jurisdiction: impl Into<String>) -> Self {
        self.0.jurisdiction = Some(jurisdiction.into());
        self
    }

    #[must_use]
    pub fn verified_data(mut self, data: Option<serde_json::Value>) -> Self {
        self.0.verified_data = Some(data);
        self
    }

    #[must_use]
    pub fn terms(mut self, terms: Option<serde_json::Value>) -> Self {
        self.0.terms = Some(terms);
        self
    }

    #[must_use]
    pub fn build(self) -> DealUpdate {
        self.0
    }
}

impl Default for DealUpdateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_only_changed_fields() {
        let update = DealUpdateBuilder::new().name("Renamed").build();
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({"name": "Renamed"}));
        assert!(update.is_user_editable());
    }

    #[test]
    fn terms_are_not_user_editable() {
        let update = DealUpdateBuilder::new()
            .terms(Some(serde_json::json!({})))
            .build();
        assert!(!update.is_user_editable());
        assert!(!update.is_empty());
        assert!(DealUpdate::default().is_empty());
    }
}
