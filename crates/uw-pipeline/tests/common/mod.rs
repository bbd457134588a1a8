//! Shared fixtures for pipeline integration tests.
//!
//! Uploads are JSON envelopes `{"doc_type", "ocr", "model"}` so one file
//! carries both extraction passes. The scripted model drafts compliant
//! documents from the prompt's own section and figure lists.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use uw_blob::BlobStore;
use uw_config::{UwConfig, WindowConfig};
use uw_core::entities::{Deal, SourceDocument};
use uw_core::enums::{Program, SourceDocType};
use uw_core::identity::Caller;
use uw_db::service::UwService;
use uw_llm::{Generative, LlmError};
use uw_pipeline::{Classification, IntakeError, IntakeService, OcrOutput, Pipeline};

pub const CLEAN: &str = r#"{"issues": []}"#;
pub const BLOCKING: &str =
    r#"{"issues": [{"severity": "high", "section": "Fees", "description": "fee basis not disclosed"}]}"#;

pub fn caller() -> Caller {
    Caller::new("ten-acme", "usr-analyst")
}

// ---------------------------------------------------------------------------
// Intake
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeIntake {
    pub ocr_calls: AtomicU32,
    pub extract_calls: AtomicU32,
    pub fail_extract: AtomicBool,
}

fn envelope(text: &str) -> Result<Value, IntakeError> {
    serde_json::from_str(text).map_err(|e| IntakeError::Malformed(e.to_string()))
}

#[async_trait]
impl IntakeService for FakeIntake {
    async fn ocr(&self, _doc: &SourceDocument, bytes: &[u8]) -> Result<OcrOutput, IntakeError> {
        self.ocr_calls.fetch_add(1, Ordering::SeqCst);
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|e| IntakeError::Malformed(e.to_string()))?;
        let fields = envelope(&text)?["ocr"].clone();
        Ok(OcrOutput { text, fields })
    }

    async fn classify(
        &self,
        _doc: &SourceDocument,
        text: &str,
    ) -> Result<Classification, IntakeError> {
        let doc_type = serde_json::from_value(envelope(text)?["doc_type"].clone())
            .map_err(|e| IntakeError::Malformed(e.to_string()))?;
        Ok(Classification {
            doc_type,
            confidence: 0.97,
        })
    }

    async fn extract(
        &self,
        _doc: &SourceDocument,
        _doc_type: SourceDocType,
        text: &str,
    ) -> Result<Value, IntakeError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_extract.load(Ordering::SeqCst) {
            return Err(IntakeError::Provider(LlmError::Api {
                status: 503,
                message: "extraction backend unavailable".into(),
            }));
        }
        Ok(envelope(text)?["model"].clone())
    }
}

// ---------------------------------------------------------------------------
// Generative
// ---------------------------------------------------------------------------

/// Drafts a document with every required heading and every figure token,
/// and answers reviews with `verdict`.
pub struct ScriptedLlm {
    pub verdict: Mutex<&'static str>,
    pub fail_drafts: AtomicBool,
    pub draft_delay: Mutex<Duration>,
    pub drafts: AtomicU32,
    pub reviews: AtomicU32,
    pub prompts: Mutex<Vec<String>>,
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self {
            verdict: Mutex::new(CLEAN),
            fail_drafts: AtomicBool::new(false),
            draft_delay: Mutex::new(Duration::ZERO),
            drafts: AtomicU32::new(0),
            reviews: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedLlm {
    pub fn set_verdict(&self, verdict: &'static str) {
        *self.verdict.lock().unwrap() = verdict;
    }

    pub fn last_draft_prompt(&self) -> Option<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|p| p.starts_with("Task: draft"))
            .cloned()
    }
}

fn list_after<'a>(prompt: &'a str, header: &str) -> Vec<&'a str> {
    prompt
        .split(header)
        .nth(1)
        .unwrap_or_default()
        .lines()
        .skip(1)
        .take_while(|l| l.starts_with("- "))
        .map(|l| &l[2..])
        .collect()
}

#[async_trait]
impl Generative for ScriptedLlm {
    async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.starts_with("Task: compliance_review") {
            self.reviews.fetch_add(1, Ordering::SeqCst);
            return Ok((*self.verdict.lock().unwrap()).to_string());
        }

        let delay = *self.draft_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_drafts.load(Ordering::SeqCst) {
            return Err(LlmError::Api {
                status: 503,
                message: "model overloaded".into(),
            });
        }
        self.drafts.fetch_add(1, Ordering::SeqCst);

        let mut body = String::from("# Draft\n\n");
        for section in list_after(prompt, "Required sections:") {
            body.push_str(&format!("## {section}\nAs agreed.\n\n"));
        }
        body.push_str("## Figures\n");
        for figure in list_after(prompt, "Figures:") {
            body.push_str(&format!("- {figure}\n"));
        }
        Ok(body)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub pipeline: Pipeline,
    pub llm: Arc<ScriptedLlm>,
    pub intake: Arc<FakeIntake>,
}

/// Limits high enough that only the rate-limit tests ever hit them.
pub fn test_config() -> UwConfig {
    let mut config = UwConfig::default();
    let roomy = WindowConfig {
        limit: 10_000,
        window_secs: 60,
    };
    config.rate_limit.read = roomy;
    config.rate_limit.write = roomy;
    config.rate_limit.pipeline = roomy;
    config
}

pub async fn harness() -> Harness {
    harness_with(&test_config()).await
}

pub async fn harness_with(config: &UwConfig) -> Harness {
    let store = Arc::new(UwService::new_local(":memory:").await.unwrap());
    let llm = Arc::new(ScriptedLlm::default());
    let intake = Arc::new(FakeIntake::default());
    let pipeline = Pipeline::new(
        store,
        BlobStore::in_memory(),
        llm.clone(),
        intake.clone(),
        config,
    );
    Harness {
        pipeline,
        llm,
        intake,
    }
}

impl Harness {
    pub async fn deal(&self, program: Program) -> Deal {
        self.pipeline
            .create_deal(&caller(), "Harbor Point Apartments", program, "NY")
            .await
            .unwrap()
    }

    pub async fn upload(&self, deal_id: &str, doc_type: &str, ocr: Value, model: Value) {
        let body = json!({ "doc_type": doc_type, "ocr": ocr, "model": model });
        self.pipeline
            .add_source(
                &caller(),
                deal_id,
                &format!("{doc_type}.json"),
                "application/json",
                serde_json::to_vec(&body).unwrap(),
            )
            .await
            .unwrap();
    }

    /// Application, appraisal and operating statement that agree with each
    /// other. `noi` is the declared net operating income; anything other
    /// than 180000 breaks the statement's own arithmetic.
    pub async fn upload_package(&self, deal_id: &str, noi: u64) {
        let application = json!({
            "borrower_name": "Harbor Point LLC",
            "requested_amount": 1_000_000,
            "property_value": 1_500_000
        });
        self.upload(deal_id, "loan_application", application.clone(), application)
            .await;

        let appraisal = json!({ "appraised_value": "$1,500,000.00" });
        self.upload(deal_id, "appraisal", appraisal.clone(), appraisal)
            .await;

        let statement = json!({
            "effective_gross_income": 300_000,
            "total_operating_expenses": 120_000,
            "net_operating_income": noi
        });
        self.upload(deal_id, "operating_statement", statement.clone(), statement)
            .await;
    }

    /// A deal with a clean package, ready to run.
    pub async fn ready_deal(&self, program: Program) -> Deal {
        let deal = self.deal(program).await;
        self.upload_package(&deal.id, 180_000).await;
        deal
    }
}
