use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::SourceDocType;

/// An uploaded borrower/investor/fund file and what was extracted from it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SourceDocument {
    pub id: String,
    pub deal_id: String,
    pub tenant_id: String,
    pub filename: String,
    pub storage_key: String,
    pub content_type: String,
    pub doc_type: Option<SourceDocType>,
    /// Classifier confidence in `[0, 1]`.
    pub classification_confidence: Option<f64>,
    pub ocr_text: Option<String>,
    /// Key/value payload from the layout (OCR) extractor.
    pub ocr_extraction: Option<serde_json::Value>,
    /// Structured payload from the model extractor.
    pub model_extraction: Option<serde_json::Value>,
    /// Merged record produced by the reconciler.
    pub reconciled: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SourceDocument {
    /// Whether classification has already been recorded.
    #[must_use]
    pub const fn is_classified(&self) -> bool {
        self.doc_type.is_some()
    }

    /// Whether both extraction payloads are present.
    #[must_use]
    pub const fn is_extracted(&self) -> bool {
        self.ocr_extraction.is_some() && self.model_extraction.is_some()
    }
}
