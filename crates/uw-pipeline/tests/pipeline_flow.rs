//! End-to-end pipeline runs against an in-memory store
//!
//! - A clean package runs straight through to `complete`
//! - A blocking verification issue pauses the deal until it is resolved
//! - A correction that still fails the check reopens the issue
//! - Stage failures park the deal in `error`; restart resumes from the step
//! - Two drivers on one deal generate each document once
//! - The review loop stops at the cycle cap and hands off to a human
//! - Rate limiting refuses work before anything runs

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use uw_core::enums::{
    AuditAction, CheckType, ComplianceStatus, DealStatus, DocumentStatus, EntityType,
    GeneratedDocType, OperationClass, Program, ResolutionStatus,
};
use uw_db::repos::audit::AuditFilter;
use uw_db::repos::verification_issue::Resolution;
use uw_db::updates::deal::DealUpdateBuilder;
use uw_pipeline::{DownloadBody, ManualClock, PipelineError, RateLimiter};
use uw_rules::Terms;

use common::{BLOCKING, caller, harness, harness_with, test_config};

async fn actions(h: &common::Harness, entity_id: &str) -> Vec<AuditAction> {
    h.pipeline.audit().drain().await;
    let filter = AuditFilter {
        entity_id: Some(entity_id.to_string()),
        ..AuditFilter::default()
    };
    let mut entries = h.pipeline.audit_log(&caller(), &filter).await.unwrap();
    entries.sort_by_key(|e| e.created_at);
    entries.into_iter().map(|e| e.action).collect()
}

#[tokio::test]
async fn clean_package_runs_to_complete() {
    let h = harness().await;
    let deal = h.ready_deal(Program::Conventional).await;

    let run = h.pipeline.run(&caller(), &deal.id).await.unwrap();

    assert_eq!(run.started_from, DealStatus::Uploaded);
    assert_eq!(run.deal.status, DealStatus::Complete);
    assert!(run.pending_issues.is_empty());

    let mut produced: Vec<GeneratedDocType> = run.documents.iter().map(|d| d.doc_type).collect();
    produced.sort_by_key(|t| t.as_str());
    let mut expected = Program::Conventional.document_plan().to_vec();
    expected.push(GeneratedDocType::CreditMemo);
    expected.sort_by_key(|t| t.as_str());
    assert_eq!(produced, expected);

    for doc in &run.documents {
        assert_eq!(doc.version, 1);
        assert_eq!(doc.status, DocumentStatus::Generated);
        assert_eq!(doc.compliance_status, ComplianceStatus::Passed);
        assert_eq!(doc.review_cycles, 1);
        assert!(doc.regulatory_checks.iter().all(|c| c.passed));
    }

    // Every source went through each intake pass once.
    assert_eq!(h.intake.ocr_calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.intake.extract_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn generated_figures_come_from_the_rules_engine() {
    let h = harness().await;
    let deal = h.ready_deal(Program::Conventional).await;
    let run = h.pipeline.run(&caller(), &deal.id).await.unwrap();

    let terms = Terms::from_json(run.deal.terms.as_ref().unwrap()).unwrap();
    assert_eq!(terms.loan_amount, 1_000_000.into());
    assert_eq!(terms.net_operating_income, 180_000.into());
    let figures = terms.figures();

    let sheet = run
        .documents
        .iter()
        .find(|d| d.doc_type == GeneratedDocType::TermSheet)
        .unwrap();
    let download = h.pipeline.download(&caller(), &sheet.id, None).await.unwrap();
    let DownloadBody::Bytes(bytes) = download.body else {
        panic!("memory store cannot presign");
    };
    let body = String::from_utf8(bytes).unwrap();
    assert!(body.contains("## Loan Terms"));
    assert!(body.contains(&figures["loan_amount"]));
    assert!(body.contains(&figures["interest_rate"]));
    assert!(!body.contains("{{"));
}

#[tokio::test]
async fn run_without_sources_is_rejected_before_any_work() {
    let h = harness().await;
    let deal = h.deal(Program::Bridge).await;

    let err = h.pipeline.run(&caller(), &deal.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)), "{err}");

    let after = h.pipeline.get_deal(&caller(), &deal.id).await.unwrap();
    assert_eq!(after.status, DealStatus::Uploaded);
    assert_eq!(h.intake.ocr_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn blocking_issue_pauses_until_corrected() {
    let h = harness().await;
    let deal = h.deal(Program::Conventional).await;
    h.upload_package(&deal.id, 190_000).await;

    let run = h.pipeline.run(&caller(), &deal.id).await.unwrap();
    assert_eq!(run.deal.status, DealStatus::Resolving);
    assert!(run.documents.is_empty());
    assert_eq!(run.pending_issues.len(), 1);
    let issue = &run.pending_issues[0];
    assert_eq!(issue.check_type, CheckType::Math);
    assert_eq!(issue.field_path, "operating_statement.net_operating_income");
    assert_eq!(issue.expected, "180000");
    assert_eq!(issue.actual, "190000");

    // Nothing moves while the issue is pending.
    let again = h.pipeline.run(&caller(), &deal.id).await.unwrap();
    assert_eq!(again.deal.status, DealStatus::Resolving);
    assert_eq!(again.pending_issues.len(), 1);

    let resolved = h
        .pipeline
        .resolve_issue(
            &caller(),
            &issue.id,
            &Resolution {
                status: ResolutionStatus::Corrected,
                corrected_value: Some("180000".into()),
                note: Some("typo on the statement".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(resolved.resolved_by.as_deref(), Some("usr-analyst"));

    let run = h.pipeline.run(&caller(), &deal.id).await.unwrap();
    assert_eq!(run.started_from, DealStatus::Resolving);
    assert_eq!(run.deal.status, DealStatus::Complete);

    let terms = Terms::from_json(run.deal.terms.as_ref().unwrap()).unwrap();
    assert_eq!(terms.net_operating_income, 180_000.into());

    // The corrected figure does not raise the same issue again.
    let all = h.pipeline.list_issues(&caller(), &deal.id, None).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, ResolutionStatus::Corrected);

    let twice = h
        .pipeline
        .resolve_issue(
            &caller(),
            &issue.id,
            &Resolution {
                status: ResolutionStatus::Confirmed,
                corrected_value: None,
                note: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(twice, PipelineError::Validation(_)), "{twice}");

    assert!(actions(&h, &issue.id).await.contains(&AuditAction::IssueResolved));
}

#[tokio::test]
async fn wrong_correction_reopens_the_issue() {
    let h = harness().await;
    let deal = h.deal(Program::Conventional).await;
    h.upload_package(&deal.id, 190_000).await;
    let run = h.pipeline.run(&caller(), &deal.id).await.unwrap();
    let issue_id = run.pending_issues[0].id.clone();

    let correct = |value: &str| Resolution {
        status: ResolutionStatus::Corrected,
        corrected_value: Some(value.to_string()),
        note: None,
    };

    // Effective gross income less expenses is 180000, not 250000.
    h.pipeline
        .resolve_issue(&caller(), &issue_id, &correct("250000"))
        .await
        .unwrap();
    let run = h.pipeline.run(&caller(), &deal.id).await.unwrap();
    assert_eq!(run.deal.status, DealStatus::Resolving);
    assert!(run.documents.is_empty());
    assert_eq!(run.pending_issues.len(), 1);
    let reopened = &run.pending_issues[0];
    assert_eq!(reopened.id, issue_id);
    assert_eq!(reopened.expected, "180000");
    assert_eq!(reopened.actual, "250000");
    assert_eq!(reopened.corrected_value, None);

    h.pipeline
        .resolve_issue(&caller(), &issue_id, &correct("180000"))
        .await
        .unwrap();
    let run = h.pipeline.run(&caller(), &deal.id).await.unwrap();
    assert_eq!(run.deal.status, DealStatus::Complete);
    let terms = Terms::from_json(run.deal.terms.as_ref().unwrap()).unwrap();
    assert_eq!(terms.net_operating_income, 180_000.into());
}

#[tokio::test]
async fn extraction_disagreement_is_reported_per_source() {
    let h = harness().await;
    let deal = h.deal(Program::Conventional).await;
    h.upload_package(&deal.id, 180_000).await;
    h.upload(
        &deal.id,
        "bank_statement",
        json!({ "beginning_balance": 10_000, "total_deposits": 5_000, "total_withdrawals": 2_000, "ending_balance": 13_000 }),
        json!({ "beginning_balance": 10_000, "total_deposits": 5_000, "total_withdrawals": 2_000, "ending_balance": 31_000 }),
    )
    .await;

    let run = h.pipeline.run(&caller(), &deal.id).await.unwrap();
    assert_eq!(run.deal.status, DealStatus::Resolving);
    let disputed: Vec<&str> = run
        .pending_issues
        .iter()
        .filter(|i| i.check_type == CheckType::ExtractionDisagreement)
        .map(|i| i.field_path.as_str())
        .collect();
    assert_eq!(disputed, vec!["bank_statement.ending_balance"]);
}

#[tokio::test]
async fn stage_failure_parks_the_deal_and_restart_resumes() {
    let h = harness().await;
    let deal = h.ready_deal(Program::Bridge).await;
    h.intake.fail_extract.store(true, Ordering::SeqCst);

    let err = h.pipeline.run(&caller(), &deal.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Intake(_)), "{err}");

    let parked = h.pipeline.get_deal(&caller(), &deal.id).await.unwrap();
    assert_eq!(parked.status, DealStatus::Error);
    assert_eq!(parked.error_step, Some(DealStatus::Extracting));
    assert!(parked.error_message.unwrap().contains("extraction backend unavailable"));

    // A plain run does not clear the error.
    let err = h.pipeline.run(&caller(), &deal.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)), "{err}");

    h.intake.fail_extract.store(false, Ordering::SeqCst);
    let run = h.pipeline.restart(&caller(), &deal.id).await.unwrap();
    assert_eq!(run.started_from, DealStatus::Error);
    assert_eq!(run.deal.status, DealStatus::Complete);
    assert_eq!(run.deal.error_step, None);

    // OCR was recorded before the failure and is not repeated.
    assert_eq!(h.intake.ocr_calls.load(Ordering::SeqCst), 3);

    let history = actions(&h, &deal.id).await;
    assert!(history.contains(&AuditAction::PipelineFailed));
    assert!(history.contains(&AuditAction::PipelineRestarted));
}

#[tokio::test]
async fn generation_failure_keeps_finished_documents() {
    let h = harness().await;
    let deal = h.ready_deal(Program::Conventional).await;
    h.llm.fail_drafts.store(true, Ordering::SeqCst);

    let err = h.pipeline.run(&caller(), &deal.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Provider(_)), "{err}");
    let parked = h.pipeline.get_deal(&caller(), &deal.id).await.unwrap();
    assert_eq!(parked.error_step, Some(DealStatus::GeneratingDocs));

    h.llm.fail_drafts.store(false, Ordering::SeqCst);
    let run = h.pipeline.restart(&caller(), &deal.id).await.unwrap();
    assert_eq!(run.deal.status, DealStatus::Complete);
    assert_eq!(run.documents.len(), 5);
}

#[tokio::test]
async fn concurrent_runs_generate_each_document_once() {
    let h = harness().await;
    let deal = h.ready_deal(Program::Conventional).await;
    *h.llm.draft_delay.lock().unwrap() = Duration::from_millis(100);

    let first_caller = caller();
    let first = h.pipeline.run(&first_caller, &deal.id);
    let second = async {
        for _ in 0..400 {
            let current = h.pipeline.get_deal(&caller(), &deal.id).await.unwrap();
            if current.status == DealStatus::GeneratingDocs {
                return h.pipeline.run(&caller(), &deal.id).await;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("deal never reached generating_docs");
    };
    let (a, b) = tokio::join!(first, second);

    let (won, lost) = match (a, b) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
        (a, b) => panic!("expected one driver to finish, got {a:?} and {b:?}"),
    };
    assert!(lost.is_conflict(), "{lost}");
    assert_eq!(won.deal.status, DealStatus::Complete);

    let after = h.pipeline.get_deal(&caller(), &deal.id).await.unwrap();
    assert_eq!(after.status, DealStatus::Complete);
    assert_eq!(after.error_step, None);

    // One draft per document: the second driver never reached the model.
    assert_eq!(h.llm.drafts.load(Ordering::SeqCst), 5);
    let docs = h.pipeline.list_documents(&caller(), &deal.id).await.unwrap();
    assert_eq!(docs.len(), 5);
    for doc in &docs {
        assert_eq!(doc.version, 1);
        let download = h.pipeline.download(&caller(), &doc.id, None).await.unwrap();
        let DownloadBody::Bytes(bytes) = download.body else {
            panic!("expected inline bytes for {}", doc.id);
        };
        assert!(String::from_utf8(bytes).unwrap().starts_with("# Draft"));
    }
}

#[tokio::test]
async fn restart_requires_an_error() {
    let h = harness().await;
    let deal = h.ready_deal(Program::Conventional).await;
    let err = h.pipeline.restart(&caller(), &deal.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidTransition { .. }), "{err}");
}

#[tokio::test]
async fn review_loop_stops_at_the_cycle_cap() {
    let h = harness().await;
    h.llm.set_verdict(BLOCKING);
    let deal = h.ready_deal(Program::Conventional).await;

    let run = h.pipeline.run(&caller(), &deal.id).await.unwrap();
    assert_eq!(run.deal.status, DealStatus::NeedsReview);
    assert_eq!(run.documents.len(), 5);
    for doc in &run.documents {
        assert_eq!(doc.review_cycles, 3);
        assert_eq!(doc.status, DocumentStatus::NeedsReview);
        assert_eq!(doc.compliance_status, ComplianceStatus::Failed);
        assert_eq!(doc.compliance_issues.len(), 1);
    }
    assert_eq!(h.llm.drafts.load(Ordering::SeqCst), 15);

    // Later drafts see what the reviewer said.
    let prompt = h.llm.last_draft_prompt().unwrap();
    assert!(prompt.contains("Compliance issues:"));
    assert!(prompt.contains("fee basis not disclosed"));

    // Reviewing every document lets the deal run through again.
    for doc in &run.documents {
        h.pipeline
            .review_document(&caller(), &doc.id, DocumentStatus::Reviewed)
            .await
            .unwrap();
    }
    let run = h.pipeline.run(&caller(), &deal.id).await.unwrap();
    assert_eq!(run.started_from, DealStatus::NeedsReview);
    assert_eq!(run.deal.status, DealStatus::Complete);
    assert_eq!(h.llm.drafts.load(Ordering::SeqCst), 15, "existing documents are kept");
}

#[rstest]
#[case(Program::Conventional, 5)]
#[case(Program::Sba7a, 5)]
#[case(Program::Syndication, 4)]
#[tokio::test]
async fn document_plan_follows_program(#[case] program: Program, #[case] documents: usize) {
    let h = harness().await;
    let deal = h.ready_deal(program).await;
    let run = h.pipeline.run(&caller(), &deal.id).await.unwrap();
    assert_eq!(run.documents.len(), documents);
    assert!(
        run.documents
            .iter()
            .any(|d| d.doc_type == GeneratedDocType::CreditMemo)
    );
}

#[tokio::test]
async fn edits_are_limited_to_editable_states() {
    let h = harness().await;
    let deal = h.ready_deal(Program::Conventional).await;

    let update = DealUpdateBuilder::new().jurisdiction("ZZ").build();
    let err = h.pipeline.edit_deal(&caller(), &deal.id, &update).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)), "{err}");

    let update = DealUpdateBuilder::new().name("Harbor Point II").build();
    let edited = h.pipeline.edit_deal(&caller(), &deal.id, &update).await.unwrap();
    assert_eq!(edited.name, "Harbor Point II");

    h.pipeline.run(&caller(), &deal.id).await.unwrap();
    let err = h.pipeline.edit_deal(&caller(), &deal.id, &update).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)), "{err}");

    let err = h
        .pipeline
        .add_source(&caller(), &deal.id, "late.json", "application/json", b"{}".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)), "{err}");
}

#[tokio::test]
async fn deleted_deals_are_not_found() {
    let h = harness().await;
    let deal = h.deal(Program::Bridge).await;
    h.pipeline.delete_deal(&caller(), &deal.id).await.unwrap();

    let err = h.pipeline.get_deal(&caller(), &deal.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)), "{err}");
    assert_eq!(
        actions(&h, &deal.id).await,
        vec![AuditAction::Created, AuditAction::Deleted]
    );
}

#[tokio::test]
async fn other_tenants_cannot_see_a_deal() {
    let h = harness().await;
    let deal = h.deal(Program::Bridge).await;
    let outsider = uw_core::identity::Caller::new("ten-other", "usr-x");
    let err = h.pipeline.get_deal(&outsider, &deal.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)), "{err}");
}

#[tokio::test]
async fn rate_limit_refuses_before_any_work() {
    let mut config = test_config();
    config.rate_limit.pipeline.limit = 1;
    config.rate_limit.pipeline.window_secs = 60;
    let clock = Arc::new(ManualClock::new());
    let mut h = harness_with(&config).await;
    h.pipeline = h
        .pipeline
        .with_limiter(Arc::new(RateLimiter::with_clock(&config.rate_limit, clock.clone())));

    let first = h.ready_deal(Program::Conventional).await;
    let second = h.ready_deal(Program::Conventional).await;
    h.pipeline.run(&caller(), &first.id).await.unwrap();
    let ocr_after_first = h.intake.ocr_calls.load(Ordering::SeqCst);

    let err = h.pipeline.run(&caller(), &second.id).await.unwrap_err();
    let PipelineError::RateLimited { class, retry_after } = err else {
        panic!("expected rate limiting, got {err}");
    };
    assert_eq!(class, OperationClass::Pipeline);
    assert!(retry_after <= Duration::from_secs(60));
    assert_eq!(h.intake.ocr_calls.load(Ordering::SeqCst), ocr_after_first);
    let untouched = h.pipeline.get_deal(&caller(), &second.id).await.unwrap();
    assert_eq!(untouched.status, DealStatus::Uploaded);

    // Reads have their own window.
    h.pipeline.list_deals(&caller(), None, 10).await.unwrap();

    clock.advance(Duration::from_secs(61));
    let run = h.pipeline.run(&caller(), &second.id).await.unwrap();
    assert_eq!(run.deal.status, DealStatus::Complete);
}

#[tokio::test]
async fn stage_transitions_are_audited_in_order() {
    let h = harness().await;
    let deal = h.ready_deal(Program::Bridge).await;
    h.pipeline.run(&caller(), &deal.id).await.unwrap();
    h.pipeline.audit().drain().await;

    let filter = AuditFilter {
        entity_type: Some(EntityType::Deal),
        entity_id: Some(deal.id.clone()),
        action: Some(AuditAction::StatusChanged),
        ..AuditFilter::default()
    };
    let mut entries = h.pipeline.audit_log(&caller(), &filter).await.unwrap();
    entries.sort_by_key(|e| e.created_at);
    let path: Vec<String> = entries
        .iter()
        .map(|e| e.detail.as_ref().unwrap()["to"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        path,
        vec![
            "processing_ocr",
            "classifying",
            "extracting",
            "verifying",
            "analyzing",
            "structuring",
            "generating_docs",
            "generating_memo",
            "complete",
        ]
    );
}
