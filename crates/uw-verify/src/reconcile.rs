//! Merging the OCR and model extractions of one source document.
//!
//! Both payloads are flattened to dotted paths (`borrower.name`,
//! `units.3.monthly_rent`) and compared field by field:
//!
//! | present in | values                     | provenance      | issue |
//! |------------|----------------------------|-----------------|-------|
//! | both       | equal within tolerance     | `Agreed`        | none  |
//! | both       | different                  | `Disagreement`  | warn / fail by divergence |
//! | one        | n/a                        | `OcrOnly` / `ModelOnly` | none, lower confidence |
//!
//! Reconciliation is pure; it never touches the stored source document.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use uw_config::VerificationConfig;
use uw_core::entities::NewVerificationIssue;
use uw_core::enums::{CheckType, ExtractionSource, Provenance, Severity, SourceDocType};

use crate::value::{display_value, format_decimal, normalize_text, parse_decimal, pct_difference};

/// Confidence assigned to an agreed field.
pub const AGREED_CONFIDENCE: f64 = 0.95;
/// Confidence assigned to a field only one extractor produced.
pub const SINGLE_SOURCE_CONFIDENCE: f64 = 0.6;
/// Confidence assigned to a disputed field.
pub const DISAGREEMENT_CONFIDENCE: f64 = 0.3;

/// One field of an extraction payload, tagged with the extractor that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionField {
    pub path: String,
    pub value: Value,
    pub source: ExtractionSource,
}

/// Flatten a payload into its leaf fields, ordered by path.
///
/// Objects contribute `key` segments and arrays contribute index segments.
/// `null` leaves are treated as absent.
#[must_use]
pub fn flatten(payload: &Value, source: ExtractionSource) -> Vec<ExtractionField> {
    let mut out = Vec::new();
    flatten_into(payload, String::new(), source, &mut out);
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

fn flatten_into(value: &Value, path: String, source: ExtractionSource, out: &mut Vec<ExtractionField>) {
    let child = |segment: &str| {
        if path.is_empty() {
            segment.to_string()
        } else {
            format!("{path}.{segment}")
        }
    };
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                flatten_into(v, child(key), source, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(v, child(&i.to_string()), source, out);
            }
        }
        Value::Null => {}
        leaf => {
            if !path.is_empty() {
                out.push(ExtractionField {
                    path,
                    value: leaf.clone(),
                    source,
                });
            }
        }
    }
}

/// A merged field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledField {
    /// Working value: the agreed value, the only value, or the OCR value
    /// when the extractors disagree.
    pub value: Value,
    pub provenance: Provenance,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_value: Option<Value>,
    /// Percentage divergence for numeric disagreements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pct_difference: Option<Decimal>,
    /// Set only for disagreements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

/// The merged record for one source document, keyed by flattened path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciledRecord {
    pub fields: BTreeMap<String, ReconciledField>,
}

impl ReconciledRecord {
    /// Disputed fields, in path order.
    pub fn disagreements(&self) -> impl Iterator<Item = (&String, &ReconciledField)> {
        self.fields
            .iter()
            .filter(|(_, f)| f.provenance == Provenance::Disagreement)
    }

    /// Extraction-disagreement issues, with paths prefixed by `doc_type`.
    #[must_use]
    pub fn issues(&self, doc_type: SourceDocType) -> Vec<NewVerificationIssue> {
        self.disagreements()
            .map(|(path, field)| {
                let detail = field.pct_difference.map_or_else(
                    || "ocr and model extractions differ".to_string(),
                    |pct| format!("ocr and model extractions differ by {}%", format_decimal(pct.round_dp(2))),
                );
                NewVerificationIssue {
                    check_type: CheckType::ExtractionDisagreement,
                    field_path: format!("{doc_type}.{path}"),
                    expected: field.ocr_value.as_ref().map(display_value).unwrap_or_default(),
                    actual: field.model_value.as_ref().map(display_value).unwrap_or_default(),
                    severity: field.severity.unwrap_or(Severity::Warn),
                    detail,
                }
            })
            .collect()
    }

    /// Serialize for storage on the source document.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; not expected for this type.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Read a record stored by [`Self::to_json`].
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is not a stored record.
    pub fn from_json(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }
}

/// Field-level comparison thresholds.
#[derive(Debug, Clone)]
pub struct Reconciler {
    abs_tolerance: Decimal,
    pct_tolerance: Decimal,
    fail_pct: Decimal,
}

impl Reconciler {
    #[must_use]
    pub fn from_config(config: &VerificationConfig) -> Self {
        Self {
            abs_tolerance: config.reconcile_abs_tolerance,
            pct_tolerance: config.reconcile_pct_tolerance,
            fail_pct: config.reconcile_fail_pct,
        }
    }

    /// Merge two extractions of the same document.
    #[must_use]
    pub fn reconcile(&self, ocr: &Value, model: &Value) -> ReconciledRecord {
        let mut ocr_fields: BTreeMap<String, Value> = flatten(ocr, ExtractionSource::Ocr)
            .into_iter()
            .map(|f| (f.path, f.value))
            .collect();
        let model_fields = flatten(model, ExtractionSource::Model);

        let mut record = ReconciledRecord::default();
        for field in model_fields {
            let merged = match ocr_fields.remove(&field.path) {
                Some(ocr_value) => self.compare(ocr_value, field.value),
                None => single(field.value, Provenance::ModelOnly),
            };
            record.fields.insert(field.path, merged);
        }
        for (path, value) in ocr_fields {
            record.fields.insert(path, single(value, Provenance::OcrOnly));
        }

        let disputed_count = record.disagreements().count();
        if disputed_count > 0 {
            tracing::debug!(fields = record.fields.len(), disputed = disputed_count, "extractions disagree");
        }
        record
    }

    fn compare(&self, ocr: Value, model: Value) -> ReconciledField {
        if let (Some(a), Some(b)) = (parse_decimal(&ocr), parse_decimal(&model)) {
            let abs = a.checked_sub(b).map(|d| d.abs());
            let pct = pct_difference(a, b);
            let within = abs.is_some_and(|d| d <= self.abs_tolerance)
                || pct.is_some_and(|p| p <= self.pct_tolerance);
            if within {
                return agreed(ocr);
            }
            let severity = if pct.is_none_or(|p| p > self.fail_pct) {
                Severity::Fail
            } else {
                Severity::Warn
            };
            return disputed(ocr, model, pct, severity);
        }

        if normalize_text(&ocr) == normalize_text(&model) {
            agreed(ocr)
        } else {
            disputed(ocr, model, None, Severity::Warn)
        }
    }
}

fn agreed(value: Value) -> ReconciledField {
    ReconciledField {
        value,
        provenance: Provenance::Agreed,
        confidence: AGREED_CONFIDENCE,
        ocr_value: None,
        model_value: None,
        pct_difference: None,
        severity: None,
    }
}

fn single(value: Value, provenance: Provenance) -> ReconciledField {
    ReconciledField {
        value,
        provenance,
        confidence: SINGLE_SOURCE_CONFIDENCE,
        ocr_value: None,
        model_value: None,
        pct_difference: None,
        severity: None,
    }
}

fn disputed(ocr: Value, model: Value, pct: Option<Decimal>, severity: Severity) -> ReconciledField {
    ReconciledField {
        value: ocr.clone(),
        provenance: Provenance::Disagreement,
        confidence: DISAGREEMENT_CONFIDENCE,
        ocr_value: Some(ocr),
        model_value: Some(model),
        pct_difference: pct,
        severity: Some(severity),
    }
}
