//! Intake: OCR, classification and model extraction of uploaded files.
//!
//! The pipeline only sees the [`IntakeService`] trait. [`ModelIntake`] is the
//! bundled implementation: it reads text uploads directly and asks the
//! generative service to classify and extract them.

use std::fmt::Write as _;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use uw_core::entities::SourceDocument;
use uw_core::enums::SourceDocType;
use uw_llm::{Generative, LlmError};

use crate::json::parse_json_object;

/// Characters of OCR text included in a prompt.
const PROMPT_TEXT_LIMIT: usize = 12_000;

#[derive(Debug, Error)]
pub enum IntakeError {
    /// The file cannot be read by this intake service.
    #[error("unsupported upload: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Provider(#[from] LlmError),

    /// The provider answered, but not in the expected shape.
    #[error("malformed intake output: {0}")]
    Malformed(String),
}

/// Layout-style text and key/value output for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    pub fields: Value,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub doc_type: SourceDocType,
    pub confidence: f64,
}

/// The document-understanding collaborator.
#[async_trait]
pub trait IntakeService: Send + Sync {
    async fn ocr(&self, doc: &SourceDocument, bytes: &[u8]) -> Result<OcrOutput, IntakeError>;

    async fn classify(
        &self,
        doc: &SourceDocument,
        text: &str,
    ) -> Result<Classification, IntakeError>;

    /// Second, independent extraction of the fields on the document.
    async fn extract(
        &self,
        doc: &SourceDocument,
        doc_type: SourceDocType,
        text: &str,
    ) -> Result<Value, IntakeError>;
}

/// Intake backed by a [`Generative`] model.
///
/// OCR accepts text and JSON uploads. `Label: value` lines become fields
/// keyed by the snake-cased label; a JSON upload is taken as its own field
/// set.
pub struct ModelIntake<G> {
    generative: G,
    max_tokens: u32,
}

impl<G: Generative> ModelIntake<G> {
    pub const fn new(generative: G, max_tokens: u32) -> Self {
        Self {
            generative,
            max_tokens,
        }
    }
}

#[async_trait]
impl<G: Generative> IntakeService for ModelIntake<G> {
    async fn ocr(&self, doc: &SourceDocument, bytes: &[u8]) -> Result<OcrOutput, IntakeError> {
        let content_type = doc.content_type.to_ascii_lowercase();
        let is_json = content_type.starts_with("application/json");
        if !is_json && !content_type.starts_with("text/") {
            return Err(IntakeError::Unsupported(format!(
                "{} ({})",
                doc.filename, doc.content_type
            )));
        }
        let text = std::str::from_utf8(bytes)
            .map_err(|e| IntakeError::Malformed(format!("{} is not UTF-8: {e}", doc.filename)))?;

        if is_json {
            let fields: Value = serde_json::from_str(text)
                .map_err(|e| IntakeError::Malformed(format!("{}: {e}", doc.filename)))?;
            return Ok(OcrOutput {
                text: text.to_string(),
                fields,
            });
        }
        Ok(OcrOutput {
            text: text.to_string(),
            fields: Value::Object(labelled_fields(text)),
        })
    }

    async fn classify(
        &self,
        doc: &SourceDocument,
        text: &str,
    ) -> Result<Classification, IntakeError> {
        let reply = self
            .generative
            .complete(&classify_prompt(doc, text), self.max_tokens)
            .await?;
        parse_classification(&reply)
    }

    async fn extract(
        &self,
        doc: &SourceDocument,
        doc_type: SourceDocType,
        text: &str,
    ) -> Result<Value, IntakeError> {
        let reply = self
            .generative
            .complete(&extract_prompt(doc, doc_type, text), self.max_tokens)
            .await?;
        parse_json_object(&reply)
            .map(Value::Object)
            .map_err(IntakeError::Malformed)
    }
}

/// `Label: value` lines as a flat field map.
fn labelled_fields(text: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    for line in text.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let key = snake_case(label);
        let value = value.trim();
        if key.is_empty() || value.is_empty() || fields.contains_key(&key) {
            continue;
        }
        fields.insert(key, Value::String(value.to_string()));
    }
    fields
}

fn snake_case(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(PROMPT_TEXT_LIMIT) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

const DOC_TYPES: &[SourceDocType] = &[
    SourceDocType::LoanApplication,
    SourceDocType::TaxReturn,
    SourceDocType::BankStatement,
    SourceDocType::OperatingStatement,
    SourceDocType::RentRoll,
    SourceDocType::Appraisal,
    SourceDocType::BalanceSheet,
    SourceDocType::CreditReport,
    SourceDocType::FundStatement,
    SourceDocType::Other,
];

fn classify_prompt(doc: &SourceDocument, text: &str) -> String {
    let mut prompt = String::from("Task: classify\n");
    let _ = writeln!(prompt, "File: {}", doc.filename);
    prompt.push_str(
        "Classify the document below as exactly one of the following types:\n",
    );
    for t in DOC_TYPES {
        let _ = writeln!(prompt, "- {t}");
    }
    prompt.push_str(
        "Respond with JSON only: {\"doc_type\": \"<type>\", \"confidence\": <0..1>}\n\nDocument:\n",
    );
    prompt.push_str(excerpt(text));
    prompt
}

fn extract_prompt(doc: &SourceDocument, doc_type: SourceDocType, text: &str) -> String {
    let mut prompt = String::from("Task: extract\n");
    let _ = writeln!(prompt, "File: {}", doc.filename);
    let _ = writeln!(prompt, "Document type: {doc_type}");
    prompt.push_str(
        "Extract every labelled figure and party from the document as a JSON object. \
         Use snake_case keys; nest repeated rows as arrays of objects. \
         Copy figures exactly as printed. Respond with JSON only.\n",
    );
    if let Some(Value::Object(ocr)) = &doc.ocr_extraction {
        if !ocr.is_empty() {
            prompt.push_str("Keys seen by OCR:\n");
            for key in ocr.keys() {
                let _ = writeln!(prompt, "- {key}");
            }
        }
    }
    prompt.push_str("\nDocument:\n");
    prompt.push_str(excerpt(text));
    prompt
}

fn parse_classification(reply: &str) -> Result<Classification, IntakeError> {
    let map = parse_json_object(reply).map_err(IntakeError::Malformed)?;
    let doc_type = map
        .get("doc_type")
        .cloned()
        .ok_or_else(|| IntakeError::Malformed("classification has no doc_type".into()))
        .and_then(|v| {
            serde_json::from_value::<SourceDocType>(v)
                .map_err(|e| IntakeError::Malformed(format!("unknown doc_type: {e}")))
        })?;
    let confidence = map
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);
    Ok(Classification {
        doc_type,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers every prompt with the same reply and keeps the last prompt.
    struct Canned {
        reply: String,
        last_prompt: Mutex<String>,
    }

    impl Canned {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.into(),
                last_prompt: Mutex::new(String::new()),
            }
        }
    }

    #[async_trait]
    impl Generative for Canned {
        async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String, LlmError> {
            *self.last_prompt.lock().unwrap() = prompt.to_string();
            Ok(self.reply.clone())
        }
    }

    fn source(content_type: &str) -> SourceDocument {
        SourceDocument {
            id: "src-1".into(),
            deal_id: "del-1".into(),
            tenant_id: "ten-acme".into(),
            filename: "statement.txt".into(),
            storage_key: "k".into(),
            content_type: content_type.into(),
            doc_type: None,
            classification_confidence: None,
            ocr_text: None,
            ocr_extraction: None,
            model_extraction: None,
            reconciled: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn ocr_reads_labelled_lines() {
        let intake = ModelIntake::new(Canned::new("{}"), 512);
        let text = "Beginning Balance: $10,000.00\nTotal Deposits: 2,500\nnoise\nEnding Balance : 12,500\n";
        let out = intake
            .ocr(&source("text/plain"), text.as_bytes())
            .await
            .unwrap();
        assert_eq!(
            out.fields,
            json!({
                "beginning_balance": "$10,000.00",
                "total_deposits": "2,500",
                "ending_balance": "12,500"
            })
        );
        assert_eq!(out.text, text);
    }

    #[tokio::test]
    async fn ocr_rejects_binary_uploads() {
        let intake = ModelIntake::new(Canned::new("{}"), 512);
        let err = intake
            .ocr(&source("application/pdf"), b"%PDF-1.7")
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Unsupported(_)));
    }

    #[tokio::test]
    async fn classify_parses_fenced_reply() {
        let intake = ModelIntake::new(
            Canned::new("```json\n{\"doc_type\": \"bank_statement\", \"confidence\": 1.4}\n```"),
            512,
        );
        let c = intake.classify(&source("text/plain"), "Ending Balance: 1").await.unwrap();
        assert_eq!(c.doc_type, SourceDocType::BankStatement);
        assert!((c.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn classify_rejects_unknown_type() {
        let intake = ModelIntake::new(Canned::new("{\"doc_type\": \"napkin\"}"), 512);
        let err = intake.classify(&source("text/plain"), "x").await.unwrap_err();
        assert!(matches!(err, IntakeError::Malformed(_)));
    }

    #[tokio::test]
    async fn extract_prompt_carries_ocr_keys() {
        let canned = Canned::new("{\"ending_balance\": 12500}");
        let intake = ModelIntake::new(canned, 512);
        let mut doc = source("text/plain");
        doc.ocr_extraction = Some(json!({"ending_balance": "12,500"}));

        let value = intake
            .extract(&doc, SourceDocType::BankStatement, "Ending Balance: 12,500")
            .await
            .unwrap();
        assert_eq!(value, json!({"ending_balance": 12500}));

        let prompt = intake.generative.last_prompt.lock().unwrap().clone();
        assert!(prompt.starts_with("Task: extract\n"));
        assert!(prompt.contains("Document type: bank_statement"));
        assert!(prompt.contains("- ending_balance"));
    }

    #[test]
    fn snake_case_labels() {
        assert_eq!(snake_case(" Net Operating Income (NOI) "), "net_operating_income_noi");
        assert_eq!(snake_case("---"), "");
    }
}
