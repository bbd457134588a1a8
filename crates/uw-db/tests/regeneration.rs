//! Regeneration concurrency integration tests
//!
//! - Two claims racing on the same version: exactly one wins
//! - Two drivers racing to create the same document: exactly one generates
//! - Version numbers strictly increase and are never reused
//! - A failed regeneration leaves status and version where they were
//! - Deal status compare-and-swap is single-flight too

use std::time::Duration;

use tempfile::TempDir;

use uw_core::enums::{
    ComplianceStatus, DealStatus, DocumentStatus, GeneratedDocType, Program, VerificationStatus,
};
use uw_core::identity::Caller;
use uw_db::error::{Conflict, DatabaseError};
use uw_db::repos::generated_document::{DocumentRevision, DocumentSlot};
use uw_db::service::UwService;

const LEASE: Duration = Duration::from_secs(600);

fn caller() -> Caller {
    Caller::new("ten-acme", "usr-analyst")
}

fn revision(status: DocumentStatus) -> DocumentRevision {
    DocumentRevision {
        status,
        compliance_status: if status == DocumentStatus::Generated {
            ComplianceStatus::Passed
        } else {
            ComplianceStatus::NeedsReview
        },
        compliance_issues: vec![],
        regulatory_checks: vec![],
        verification_status: VerificationStatus::Passed,
        verification_issues: vec![],
        review_cycles: 1,
        feedback: None,
    }
}

async fn seeded(svc: &UwService) -> String {
    let deal = svc
        .create_deal(&caller(), "Harbor Point", Program::Conventional, "ca")
        .await
        .unwrap();
    let DocumentSlot::Claimed(slot) = svc
        .claim_generated_document(&caller(), &deal.id, GeneratedDocType::LoanAgreement, LEASE)
        .await
        .unwrap()
    else {
        panic!("fresh deal has no documents");
    };
    svc.complete_regeneration(&caller(), &slot.id, 0, &revision(DocumentStatus::Generated))
        .await
        .unwrap()
        .id
}

async fn regenerate(svc: &UwService, id: &str, expected: i64) -> Result<i64, DatabaseError> {
    svc.begin_regeneration(&caller(), id, Some(expected)).await?;
    let doc = svc
        .complete_regeneration(&caller(), id, expected, &revision(DocumentStatus::Generated))
        .await?;
    Ok(doc.version)
}

// ---------------------------------------------------------------------------
// Single flight
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_claims_one_winner() {
    let svc = UwService::new_local(":memory:").await.unwrap();
    let id = seeded(&svc).await;

    let (caller_a, caller_b) = (caller(), caller());
    let (a, b) = tokio::join!(
        svc.begin_regeneration(&caller_a, &id, Some(1)),
        svc.begin_regeneration(&caller_b, &id, Some(1)),
    );

    let outcomes = [a.is_ok(), b.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(
        loser,
        Err(DatabaseError::Conflict(Conflict::InFlight))
    ));

    let doc = svc.rollback_regeneration(&caller(), &id).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Generated);
}

#[tokio::test]
async fn concurrent_slot_claims_one_generator() {
    let svc = UwService::new_local(":memory:").await.unwrap();
    let deal = svc
        .create_deal(&caller(), "Harbor Point", Program::Conventional, "CA")
        .await
        .unwrap();

    let (caller_a, caller_b) = (caller(), caller());
    let (a, b) = tokio::join!(
        svc.claim_generated_document(&caller_a, &deal.id, GeneratedDocType::TermSheet, LEASE),
        svc.claim_generated_document(&caller_b, &deal.id, GeneratedDocType::TermSheet, LEASE),
    );
    let (won, lost) = match (a, b) {
        (Ok(DocumentSlot::Claimed(won)), lost) | (lost, Ok(DocumentSlot::Claimed(won))) => {
            (won, lost)
        }
        (a, b) => panic!("expected one claim, got {a:?} and {b:?}"),
    };
    assert!(matches!(
        lost,
        Err(DatabaseError::Conflict(Conflict::InFlight))
    ));

    svc.complete_regeneration(&caller(), &won.id, 0, &revision(DocumentStatus::Generated))
        .await
        .unwrap();
    let after = svc
        .claim_generated_document(&caller(), &deal.id, GeneratedDocType::TermSheet, LEASE)
        .await
        .unwrap();
    assert!(matches!(after, DocumentSlot::Existing(doc) if doc.id == won.id && doc.version == 1));
}

#[tokio::test]
async fn concurrent_full_regenerations_file_backed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("uw.db");
    let svc = UwService::new_local(path.to_str().unwrap()).await.unwrap();
    let id = seeded(&svc).await;

    let (a, b) = tokio::join!(regenerate(&svc, &id, 1), regenerate(&svc, &id, 1));
    let versions: Vec<i64> = [&a, &b].iter().filter_map(|r| r.as_ref().ok().copied()).collect();
    assert_eq!(versions, vec![2]);

    let doc = svc.get_generated_document(&caller(), &id).await.unwrap();
    assert_eq!(doc.version, 2);
    assert_ne!(doc.status, DocumentStatus::Regenerating);
}

// ---------------------------------------------------------------------------
// Monotonicity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn versions_strictly_increase() {
    let svc = UwService::new_local(":memory:").await.unwrap();
    let id = seeded(&svc).await;

    for expected in 1..=4 {
        let v = regenerate(&svc, &id, expected).await.unwrap();
        assert_eq!(v, expected + 1);
    }
    // A failed attempt in between must not consume a number.
    svc.begin_regeneration(&caller(), &id, Some(5)).await.unwrap();
    svc.rollback_regeneration(&caller(), &id).await.unwrap();
    assert_eq!(regenerate(&svc, &id, 5).await.unwrap(), 6);

    let history = svc.list_document_versions(&caller(), &id).await.unwrap();
    let numbers: Vec<i64> = history.iter().map(|v| v.version).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
    let mut keys: Vec<&str> = history.iter().map(|v| v.storage_key.as_str()).collect();
    keys.dedup();
    assert_eq!(keys.len(), 6);
}

#[tokio::test]
async fn reviewed_document_survives_failed_regeneration() {
    let svc = UwService::new_local(":memory:").await.unwrap();
    let id = seeded(&svc).await;
    regenerate(&svc, &id, 1).await.unwrap();
    regenerate(&svc, &id, 2).await.unwrap();
    svc.transition_generated_document(&caller(), &id, DocumentStatus::Reviewed)
        .await
        .unwrap();

    let (caller_a, caller_b) = (caller(), caller());
    let (a, b) = tokio::join!(
        svc.begin_regeneration(&caller_a, &id, Some(3)),
        svc.begin_regeneration(&caller_b, &id, Some(3)),
    );
    assert!(a.is_ok() ^ b.is_ok());

    // Winner's downstream generation fails.
    let doc = svc.rollback_regeneration(&caller(), &id).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Reviewed);
    assert_eq!(doc.version, 3);
    assert_eq!(svc.list_document_versions(&caller(), &id).await.unwrap().len(), 3);
}

// ---------------------------------------------------------------------------
// Deal status CAS
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deal_stage_claim_is_single_flight() {
    let svc = UwService::new_local(":memory:").await.unwrap();
    let deal = svc
        .create_deal(&caller(), "Harbor Point", Program::Conventional, "CA")
        .await
        .unwrap();

    let (caller_a, caller_b) = (caller(), caller());
    let (a, b) = tokio::join!(
        svc.compare_and_swap_deal_status(
            &caller_a,
            &deal.id,
            DealStatus::Uploaded,
            DealStatus::ProcessingOcr
        ),
        svc.compare_and_swap_deal_status(
            &caller_b,
            &deal.id,
            DealStatus::Uploaded,
            DealStatus::ProcessingOcr
        ),
    );
    assert_eq!(a.unwrap() + b.unwrap(), 1);
}
