//! The verified dataset a deal is underwritten from.
//!
//! Keys are `"<source_doc_type>.<field.path>"`. The dataset is built from the
//! reconciled records of every classified source document, then human
//! corrections are laid over it. It is stored on the deal as
//! `verified_data` and is the only input the rules engine and the generator
//! read figures from.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde_json::{Map, Value};

use uw_core::entities::VerificationIssue;
use uw_core::enums::{ResolutionStatus, SourceDocType};

use crate::reconcile::ReconciledRecord;
use crate::value::parse_decimal;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifiedDataset {
    values: BTreeMap<String, Value>,
}

impl VerifiedDataset {
    /// Build from reconciled records in upload order.
    ///
    /// When two documents of the same type carry the same path, the first
    /// uploaded wins.
    #[must_use]
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = (SourceDocType, &'a ReconciledRecord)>,
    {
        let mut values = BTreeMap::new();
        for (doc_type, record) in records {
            for (path, field) in &record.fields {
                let key = format!("{doc_type}.{path}");
                if values.contains_key(&key) {
                    tracing::debug!(%key, "duplicate field from a later document ignored");
                    continue;
                }
                values.insert(key, field.value.clone());
            }
        }
        Self { values }
    }

    /// Lay `corrected` resolutions over the extracted values. Returns the
    /// number of fields changed.
    pub fn apply_corrections(&mut self, issues: &[VerificationIssue]) -> usize {
        let mut applied = 0;
        for issue in issues {
            if issue.status != ResolutionStatus::Corrected {
                continue;
            }
            let Some(raw) = issue.corrected_value.as_deref() else {
                continue;
            };
            self.values
                .insert(issue.field_path.clone(), Value::String(raw.trim().to_string()));
            applied += 1;
        }
        applied
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// A field read as a figure.
    #[must_use]
    pub fn decimal(&self, key: &str) -> Option<Decimal> {
        self.values.get(key).and_then(parse_decimal)
    }

    /// A field read as text.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Keys matching `pattern`, where a `*` segment matches any one segment
    /// (typically an array index).
    pub fn matching<'a>(&'a self, pattern: &'a str) -> impl Iterator<Item = (&'a String, &'a Value)> {
        let want: Vec<&str> = pattern.split('.').collect();
        self.values.iter().filter(move |(key, _)| {
            let have: Vec<&str> = key.split('.').collect();
            have.len() == want.len()
                && have
                    .iter()
                    .zip(&want)
                    .all(|(h, w)| *w == "*" || h == w)
        })
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Flat JSON object for storage.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<String, Value>>(),
        )
    }

    /// Read a dataset stored by [`Self::to_json`]. Non-object values give an
    /// empty dataset.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        let values = value
            .as_object()
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::Reconciler;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use uw_config::VerificationConfig;
    use uw_core::enums::{CheckType, Severity};

    fn record(ocr: Value, model: Value) -> ReconciledRecord {
        Reconciler::from_config(&VerificationConfig::default()).reconcile(&ocr, &model)
    }

    fn corrected(path: &str, value: &str) -> VerificationIssue {
        VerificationIssue {
            id: "vis-1".into(),
            deal_id: "del-1".into(),
            check_type: CheckType::ExtractionDisagreement,
            field_path: path.into(),
            expected: "1".into(),
            actual: "2".into(),
            severity: Severity::Fail,
            status: ResolutionStatus::Corrected,
            detail: String::new(),
            corrected_value: Some(value.into()),
            resolution_note: None,
            resolved_by: Some("usr-analyst".into()),
            created_at: Utc::now(),
            resolved_at: Some(Utc::now()),
        }
    }

    #[test]
    fn keys_are_prefixed_and_first_document_wins() {
        let first = record(json!({"ending_balance": 100}), json!({"ending_balance": 100}));
        let second = record(json!({"ending_balance": 900}), json!({}));
        let data = VerifiedDataset::from_records([
            (SourceDocType::BankStatement, &first),
            (SourceDocType::BankStatement, &second),
        ]);
        assert_eq!(data.decimal("bank_statement.ending_balance"), Some(Decimal::from(100)));
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn corrections_override_extracted_values() {
        let rec = record(json!({"total": 500}), json!({"total": 900}));
        let mut data = VerifiedDataset::from_records([(SourceDocType::RentRoll, &rec)]);
        let mut pending = corrected("rent_roll.total", "1");
        pending.status = ResolutionStatus::Pending;

        let applied = data.apply_corrections(&[corrected("rent_roll.total", "$875.00"), pending]);
        assert_eq!(applied, 1);
        assert_eq!(data.decimal("rent_roll.total"), Some(Decimal::from(875)));
    }

    #[test]
    fn wildcard_matches_one_segment() {
        let rec = record(
            json!({"units": [{"rent": 1000}, {"rent": 1100}], "total": 2100}),
            json!({"units": [{"rent": 1000}, {"rent": 1100}], "total": 2100}),
        );
        let data = VerifiedDataset::from_records([(SourceDocType::RentRoll, &rec)]);
        let keys: Vec<&str> = data
            .matching("rent_roll.units.*.rent")
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(keys, vec!["rent_roll.units.0.rent", "rent_roll.units.1.rent"]);
    }

    #[test]
    fn json_roundtrip() {
        let rec = record(json!({"name": "Ada", "n": 3}), json!({"name": "Ada", "n": 3}));
        let data = VerifiedDataset::from_records([(SourceDocType::LoanApplication, &rec)]);
        assert_eq!(VerifiedDataset::from_json(&data.to_json()), data);
        assert!(VerifiedDataset::from_json(&json!(null)).is_empty());
    }
}
