//! Document regeneration through the pipeline
//!
//! - Concurrent regenerations on one version: one new version, one conflict
//! - A failed regeneration restores the prior status and version
//! - Reviewer notes reach the next draft
//! - Findings and notes from every earlier version reach the next draft
//! - Every version stays downloadable

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use pretty_assertions::assert_eq;
use uw_core::entities::GeneratedDocument;
use uw_core::enums::{AuditAction, DocumentStatus, GeneratedDocType, Program};
use uw_db::error::Conflict;
use uw_db::repos::audit::AuditFilter;
use uw_pipeline::{DownloadBody, PipelineError};

use common::{BLOCKING, CLEAN, Harness, caller, harness};

async fn completed(h: &Harness, doc_type: GeneratedDocType) -> GeneratedDocument {
    let deal = h.ready_deal(Program::Conventional).await;
    let run = h.pipeline.run(&caller(), &deal.id).await.unwrap();
    run.documents
        .into_iter()
        .find(|d| d.doc_type == doc_type)
        .unwrap()
}

async fn body(h: &Harness, doc_id: &str, version: Option<i64>) -> String {
    let download = h.pipeline.download(&caller(), doc_id, version).await.unwrap();
    match download.body {
        DownloadBody::Bytes(bytes) => String::from_utf8(bytes).unwrap(),
        DownloadBody::Url(url) => panic!("unexpected presigned url {url}"),
    }
}

async fn recorded(h: &Harness, doc_id: &str, action: AuditAction) -> usize {
    h.pipeline.audit().drain().await;
    let filter = AuditFilter {
        entity_id: Some(doc_id.to_string()),
        action: Some(action),
        ..AuditFilter::default()
    };
    h.pipeline.audit_log(&caller(), &filter).await.unwrap().len()
}

#[tokio::test]
async fn regeneration_bumps_the_version() {
    let h = harness().await;
    let doc = completed(&h, GeneratedDocType::LoanAgreement).await;

    let out = h
        .pipeline
        .regenerate(&caller(), &doc.id, Some(1), None)
        .await
        .unwrap();
    assert_eq!(out.document.version, 2);
    assert_eq!(out.document.status, DocumentStatus::Generated);
    assert!(!out.needs_review);
    assert_ne!(out.document.storage_key, doc.storage_key);

    let versions = h.pipeline.list_versions(&caller(), &doc.id).await.unwrap();
    let numbers: Vec<i64> = versions.iter().map(|v| v.version).collect();
    assert_eq!(numbers, vec![1, 2]);
    assert_eq!(recorded(&h, &doc.id, AuditAction::DocumentRegenerated).await, 1);
}

#[tokio::test]
async fn concurrent_regenerations_are_single_flight() {
    let h = harness().await;
    let doc = completed(&h, GeneratedDocType::TermSheet).await;
    *h.llm.draft_delay.lock().unwrap() = Duration::from_millis(50);

    let (caller_a, caller_b) = (caller(), caller());
    let (a, b) = tokio::join!(
        h.pipeline.regenerate(&caller_a, &doc.id, Some(1), None),
        h.pipeline.regenerate(&caller_b, &doc.id, Some(1), None),
    );

    let (won, lost) = match (a, b) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
        (a, b) => panic!("expected exactly one winner, got {a:?} and {b:?}"),
    };
    assert_eq!(won.document.version, 2);
    assert!(lost.is_conflict(), "{lost}");

    let current = h
        .pipeline
        .list_documents(&caller(), &doc.deal_id)
        .await
        .unwrap()
        .into_iter()
        .find(|d| d.id == doc.id)
        .unwrap();
    assert_eq!(current.version, 2);
    assert_eq!(current.prior_status, None);
    assert_eq!(recorded(&h, &doc.id, AuditAction::RegenerationConflict).await, 1);
}

#[tokio::test]
async fn stale_version_is_a_conflict() {
    let h = harness().await;
    let doc = completed(&h, GeneratedDocType::PromissoryNote).await;

    let err = h
        .pipeline
        .regenerate(&caller(), &doc.id, Some(7), None)
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            PipelineError::Conflict(Conflict::VersionMismatch {
                expected: 7,
                current: 1
            })
        ),
        "{err}"
    );
    assert_eq!(h.llm.drafts.load(Ordering::SeqCst), 5, "no draft for a refused claim");
}

#[tokio::test]
async fn reviewed_document_survives_a_race_and_a_failure() {
    let h = harness().await;
    let doc = completed(&h, GeneratedDocType::TermSheet).await;

    // v3, reviewed.
    h.pipeline.regenerate(&caller(), &doc.id, None, None).await.unwrap();
    h.pipeline.regenerate(&caller(), &doc.id, Some(2), None).await.unwrap();
    let v3 = h
        .pipeline
        .review_document(&caller(), &doc.id, DocumentStatus::Reviewed)
        .await
        .unwrap();
    assert_eq!((v3.version, v3.status), (3, DocumentStatus::Reviewed));

    // Two reviewers regenerate from v3 at once.
    *h.llm.draft_delay.lock().unwrap() = Duration::from_millis(50);
    let (caller_a, caller_b) = (caller(), caller());
    let (a, b) = tokio::join!(
        h.pipeline.regenerate(&caller_a, &doc.id, Some(3), None),
        h.pipeline.regenerate(&caller_b, &doc.id, Some(3), None),
    );
    let winner = match (a, b) {
        (Ok(w), Err(e)) | (Err(e), Ok(w)) => {
            assert!(e.is_conflict(), "{e}");
            w
        }
        (a, b) => panic!("expected exactly one winner, got {a:?} and {b:?}"),
    };
    assert_eq!(winner.document.version, 4);
    assert_eq!(winner.document.status, DocumentStatus::Generated);
    *h.llm.draft_delay.lock().unwrap() = Duration::ZERO;

    h.pipeline
        .review_document(&caller(), &doc.id, DocumentStatus::Reviewed)
        .await
        .unwrap();

    // A regeneration whose draft fails leaves the reviewed v4 in place.
    h.llm.fail_drafts.store(true, Ordering::SeqCst);
    let err = h
        .pipeline
        .regenerate(&caller(), &doc.id, Some(4), Some("shorten".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Provider(_)), "{err}");

    let after = h
        .pipeline
        .list_documents(&caller(), &doc.deal_id)
        .await
        .unwrap()
        .into_iter()
        .find(|d| d.id == doc.id)
        .unwrap();
    assert_eq!(after.version, 4);
    assert_eq!(after.status, DocumentStatus::Reviewed);
    assert_eq!(after.prior_status, None);

    let versions = h.pipeline.list_versions(&caller(), &doc.id).await.unwrap();
    assert_eq!(versions.len(), 4);
    assert_eq!(recorded(&h, &doc.id, AuditAction::RegenerationRolledBack).await, 1);

    // And the document can be regenerated again once the model recovers.
    h.llm.fail_drafts.store(false, Ordering::SeqCst);
    let v5 = h
        .pipeline
        .regenerate(&caller(), &doc.id, Some(4), None)
        .await
        .unwrap();
    assert_eq!(v5.document.version, 5);
}

#[tokio::test]
async fn reviewer_notes_reach_the_next_draft() {
    let h = harness().await;
    let doc = completed(&h, GeneratedDocType::LoanAgreement).await;

    let out = h
        .pipeline
        .regenerate(
            &caller(),
            &doc.id,
            Some(1),
            Some("Spell out the prepayment terms.".into()),
        )
        .await
        .unwrap();
    assert_eq!(out.document.version, 2);

    let prompt = h.llm.last_draft_prompt().unwrap();
    assert!(prompt.contains("Document: Loan Agreement"));
    assert!(prompt.contains("Reviewer notes:"));
    assert!(prompt.contains("Spell out the prepayment terms."));
}

#[tokio::test]
async fn findings_from_every_version_reach_the_next_draft() {
    const UNDATED: &str = r#"{"issues": [{"severity": "low", "section": "Signatures", "description": "signature block undated"}]}"#;

    let h = harness().await;
    h.llm.set_verdict(BLOCKING);
    let doc = completed(&h, GeneratedDocType::TermSheet).await;
    assert_eq!(doc.status, DocumentStatus::NeedsReview);

    h.llm.set_verdict(UNDATED);
    let v2 = h
        .pipeline
        .regenerate(&caller(), &doc.id, Some(1), Some("Name the guarantor.".into()))
        .await
        .unwrap();
    assert_eq!(v2.document.version, 2);
    assert!(
        v2.document
            .compliance_issues
            .iter()
            .all(|i| i.description != "fee basis not disclosed")
    );

    h.llm.set_verdict(CLEAN);
    let v3 = h
        .pipeline
        .regenerate(&caller(), &doc.id, Some(2), None)
        .await
        .unwrap();
    assert_eq!(v3.document.version, 3);

    let prompt = h.llm.last_draft_prompt().unwrap();
    assert!(prompt.contains("fee basis not disclosed"), "{prompt}");
    assert!(prompt.contains("signature block undated"), "{prompt}");
    assert!(prompt.contains("Name the guarantor."), "{prompt}");
    assert_eq!(prompt.matches("fee basis not disclosed").count(), 1);
}

#[tokio::test]
async fn every_version_stays_downloadable() {
    let h = harness().await;
    let doc = completed(&h, GeneratedDocType::PromissoryNote).await;
    let v1 = body(&h, &doc.id, None).await;

    h.pipeline.regenerate(&caller(), &doc.id, Some(1), None).await.unwrap();

    assert_eq!(body(&h, &doc.id, Some(1)).await, v1);
    let current = h.pipeline.download(&caller(), &doc.id, None).await.unwrap();
    assert_eq!(current.version, 2);

    let err = h.pipeline.download(&caller(), &doc.id, Some(9)).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)), "{err}");
    assert_eq!(recorded(&h, &doc.id, AuditAction::Downloaded).await, 3);
}

#[tokio::test]
async fn unknown_document_is_not_found() {
    let h = harness().await;
    let err = h
        .pipeline
        .regenerate(&caller(), "gdc-missing", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)), "{err}");
}
