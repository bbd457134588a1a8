//! Generated document repository.
//!
//! A document row holds the current version; every version (including the
//! first) is also appended to `document_versions`, which rejects updates.
//!
//! Regeneration is split in three so the slow generation call happens outside
//! any transaction:
//! 1. [`UwService::begin_regeneration`] claims the document with a single
//!    compare-and-swap on `(version, status != regenerating)`. The first
//!    version is claimed the same way through
//!    [`UwService::claim_generated_document`], as a version-0 placeholder.
//! 2. [`UwService::complete_regeneration`] bumps the version and appends the
//!    version row atomically.
//! 3. [`UwService::rollback_regeneration`] restores `prior_status` on failure.

use std::time::Duration;

use chrono::Utc;

use uw_core::entities::{
    ComplianceIssue, DocumentVersion, GeneratedDocument, RegulatoryCheck, VerificationIssue,
};
use uw_core::enums::{ComplianceStatus, DocumentStatus, GeneratedDocType, VerificationStatus};
use uw_core::identity::Caller;
use uw_core::ids::PREFIX_GENERATED_DOCUMENT;
use uw_core::keys::generated_document_key;

use crate::error::{Conflict, DatabaseError};
use crate::helpers::{
    finish_tx, get_opt_string, parse_datetime, parse_enum, parse_json_list, parse_optional_enum,
    to_json_text,
};
use crate::service::UwService;

const SELECT_COLS: &str = "id, deal_id, tenant_id, doc_type, storage_key, version, status, \
     prior_status, compliance_status, compliance_issues, regulatory_checks, verification_status, \
     verification_issues, review_cycles, created_at, updated_at";

const VERSION_COLS: &str = "document_id, version, storage_key, compliance_status, \
     compliance_issues, regulatory_checks, verification_status, verification_issues, \
     review_cycles, feedback, created_at";

fn row_to_document(row: &libsql::Row) -> Result<GeneratedDocument, DatabaseError> {
    Ok(GeneratedDocument {
        id: row.get(0)?,
        deal_id: row.get(1)?,
        tenant_id: row.get(2)?,
        doc_type: parse_enum(&row.get::<String>(3)?)?,
        storage_key: row.get(4)?,
        version: row.get(5)?,
        status: parse_enum(&row.get::<String>(6)?)?,
        prior_status: parse_optional_enum(get_opt_string(row, 7)?.as_deref())?,
        compliance_status: parse_enum(&row.get::<String>(8)?)?,
        compliance_issues: parse_json_list(&row.get::<String>(9)?)?,
        regulatory_checks: parse_json_list(&row.get::<String>(10)?)?,
        verification_status: parse_enum(&row.get::<String>(11)?)?,
        verification_issues: parse_json_list(&row.get::<String>(12)?)?,
        review_cycles: review_cycles(row.get::<i64>(13)?)?,
        created_at: parse_datetime(&row.get::<String>(14)?)?,
        updated_at: parse_datetime(&row.get::<String>(15)?)?,
    })
}

fn row_to_version(row: &libsql::Row) -> Result<DocumentVersion, DatabaseError> {
    Ok(DocumentVersion {
        document_id: row.get(0)?,
        version: row.get(1)?,
        storage_key: row.get(2)?,
        compliance_status: parse_enum(&row.get::<String>(3)?)?,
        compliance_issues: parse_json_list(&row.get::<String>(4)?)?,
        regulatory_checks: parse_json_list(&row.get::<String>(5)?)?,
        verification_status: parse_enum(&row.get::<String>(6)?)?,
        verification_issues: parse_json_list(&row.get::<String>(7)?)?,
        review_cycles: review_cycles(row.get::<i64>(8)?)?,
        feedback: get_opt_string(row, 9)?,
        created_at: parse_datetime(&row.get::<String>(10)?)?,
    })
}

fn review_cycles(raw: i64) -> Result<u32, DatabaseError> {
    u32::try_from(raw).map_err(|_| DatabaseError::Query(format!("invalid review_cycles: {raw}")))
}

/// Output of one generate/review run, ready to persist as a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRevision {
    /// `Generated` when review passed, `NeedsReview` otherwise.
    pub status: DocumentStatus,
    pub compliance_status: ComplianceStatus,
    pub compliance_issues: Vec<ComplianceIssue>,
    pub regulatory_checks: Vec<RegulatoryCheck>,
    pub verification_status: VerificationStatus,
    pub verification_issues: Vec<VerificationIssue>,
    pub review_cycles: u32,
    pub feedback: Option<String>,
}

impl DocumentRevision {
    fn check_status(&self) -> Result<(), DatabaseError> {
        if matches!(
            self.status,
            DocumentStatus::Generated | DocumentStatus::NeedsReview
        ) {
            Ok(())
        } else {
            Err(DatabaseError::InvalidState(format!(
                "a new version must be generated or needs_review, not {}",
                self.status
            )))
        }
    }
}

/// Outcome of [`UwService::claim_generated_document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSlot {
    /// The caller holds the version-0 placeholder and must generate.
    Claimed(GeneratedDocument),
    /// The document already has a version; nothing to generate.
    Existing(GeneratedDocument),
}

impl UwService {
    /// Claim the `(deal, doc_type)` slot before generating version 1.
    ///
    /// The claim is a placeholder row at version 0 in `regenerating`; finish
    /// it with [`Self::complete_regeneration`] at `claimed_version` 0 or drop
    /// it with [`Self::release_generated_document_claim`]. A placeholder left
    /// untouched for longer than `lease` is taken over.
    ///
    /// # Errors
    ///
    /// [`Conflict::InFlight`] while another caller holds a live claim.
    pub async fn claim_generated_document(
        &self,
        caller: &Caller,
        deal_id: &str,
        doc_type: GeneratedDocType,
        lease: Duration,
    ) -> Result<DocumentSlot, DatabaseError> {
        let id = self.db().generate_id(PREFIX_GENERATED_DOCUMENT).await?;
        let storage_key = generated_document_key(&caller.tenant_id, deal_id, doc_type, 1);
        let now = Utc::now();

        let inserted = self
            .db()
            .conn()
            .await
            .execute(
                "INSERT INTO generated_documents
                 (id, deal_id, tenant_id, doc_type, storage_key, version, status, compliance_status,
                  verification_status, review_cycles, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, 0, ?9, ?9)
                 ON CONFLICT(deal_id, doc_type) DO NOTHING",
                libsql::params![
                    id.as_str(),
                    deal_id,
                    caller.tenant_id.as_str(),
                    doc_type.as_str(),
                    storage_key.as_str(),
                    DocumentStatus::Regenerating.as_str(),
                    ComplianceStatus::NeedsReview.as_str(),
                    VerificationStatus::Passed.as_str(),
                    now.to_rfc3339()
                ],
            )
            .await?;
        if inserted == 1 {
            return Ok(DocumentSlot::Claimed(
                self.get_generated_document(caller, &id).await?,
            ));
        }

        let existing = self
            .find_generated_document(caller, deal_id, doc_type)
            .await?
            .ok_or(DatabaseError::NoResult)?;
        if existing.version > 0 {
            return Ok(DocumentSlot::Existing(existing));
        }
        let held_for = (now - existing.updated_at).to_std().unwrap_or_default();
        if held_for < lease {
            tracing::debug!(document_id = %existing.id, %doc_type, "document slot in flight");
            return Err(Conflict::InFlight.into());
        }

        let taken = self
            .db()
            .conn()
            .await
            .execute(
                "UPDATE generated_documents SET updated_at = ?1
                 WHERE id = ?2 AND tenant_id = ?3 AND version = 0 AND status = ?4 AND updated_at = ?5",
                libsql::params![
                    now.to_rfc3339(),
                    existing.id.as_str(),
                    caller.tenant_id.as_str(),
                    DocumentStatus::Regenerating.as_str(),
                    existing.updated_at.to_rfc3339()
                ],
            )
            .await?;
        if taken == 0 {
            return Err(Conflict::InFlight.into());
        }
        tracing::warn!(document_id = %existing.id, %doc_type, ?held_for, "took over an abandoned document claim");
        Ok(DocumentSlot::Claimed(
            self.get_generated_document(caller, &existing.id).await?,
        ))
    }

    /// Drop an unfinished slot claim so the document can be generated again.
    pub async fn release_generated_document_claim(
        &self,
        caller: &Caller,
        id: &str,
    ) -> Result<(), DatabaseError> {
        let affected = self
            .db()
            .conn()
            .await
            .execute(
                "DELETE FROM generated_documents
                 WHERE id = ?1 AND tenant_id = ?2 AND version = 0 AND status = ?3",
                libsql::params![id, caller.tenant_id.as_str(), DocumentStatus::Regenerating.as_str()],
            )
            .await?;
        if affected == 0 {
            tracing::debug!(document_id = id, "no document claim to release");
        }
        Ok(())
    }

    pub async fn get_generated_document(
        &self,
        caller: &Caller,
        id: &str,
    ) -> Result<GeneratedDocument, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .await
            .query(
                &format!(
                    "SELECT {SELECT_COLS} FROM generated_documents WHERE id = ?1 AND tenant_id = ?2"
                ),
                libsql::params![id, caller.tenant_id.as_str()],
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        row_to_document(&row)
    }

    /// The document of one type for a deal, if it has been generated.
    pub async fn find_generated_document(
        &self,
        caller: &Caller,
        deal_id: &str,
        doc_type: GeneratedDocType,
    ) -> Result<Option<GeneratedDocument>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .await
            .query(
                &format!(
                    "SELECT {SELECT_COLS} FROM generated_documents
                     WHERE deal_id = ?1 AND tenant_id = ?2 AND doc_type = ?3"
                ),
                libsql::params![deal_id, caller.tenant_id.as_str(), doc_type.as_str()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_document(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_generated_documents(
        &self,
        caller: &Caller,
        deal_id: &str,
    ) -> Result<Vec<GeneratedDocument>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .await
            .query(
                &format!(
                    "SELECT {SELECT_COLS} FROM generated_documents
                     WHERE deal_id = ?1 AND tenant_id = ?2 ORDER BY created_at, rowid"
                ),
                libsql::params![deal_id, caller.tenant_id.as_str()],
            )
            .await?;
        let mut docs = Vec::new();
        while let Some(row) = rows.next().await? {
            docs.push(row_to_document(&row)?);
        }
        Ok(docs)
    }

    /// Version history, oldest first.
    pub async fn list_document_versions(
        &self,
        caller: &Caller,
        document_id: &str,
    ) -> Result<Vec<DocumentVersion>, DatabaseError> {
        // Tenant check through the owning document.
        self.get_generated_document(caller, document_id).await?;
        let mut rows = self
            .db()
            .conn()
            .await
            .query(
                &format!(
                    "SELECT {VERSION_COLS} FROM document_versions WHERE document_id = ?1 ORDER BY version"
                ),
                [document_id],
            )
            .await?;
        let mut versions = Vec::new();
        while let Some(row) = rows.next().await? {
            versions.push(row_to_version(&row)?);
        }
        Ok(versions)
    }

    pub async fn get_document_version(
        &self,
        caller: &Caller,
        document_id: &str,
        version: i64,
    ) -> Result<DocumentVersion, DatabaseError> {
        self.get_generated_document(caller, document_id).await?;
        let mut rows = self
            .db()
            .conn()
            .await
            .query(
                &format!(
                    "SELECT {VERSION_COLS} FROM document_versions WHERE document_id = ?1 AND version = ?2"
                ),
                libsql::params![document_id, version],
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        row_to_version(&row)
    }

    /// Claim a document for regeneration.
    ///
    /// Succeeds for exactly one caller per `(document, version)`. When
    /// `expected_version` is `None` the current version is read first, so the
    /// claim still fails if another regeneration lands in between.
    ///
    /// # Errors
    ///
    /// [`Conflict::VersionMismatch`] when the token is stale,
    /// [`Conflict::InFlight`] when another regeneration holds the document.
    pub async fn begin_regeneration(
        &self,
        caller: &Caller,
        id: &str,
        expected_version: Option<i64>,
    ) -> Result<GeneratedDocument, DatabaseError> {
        let expected = match expected_version {
            Some(v) => v,
            None => self.get_generated_document(caller, id).await?.version,
        };

        let affected = self
            .db()
            .conn()
            .await
            .execute(
                "UPDATE generated_documents
                 SET status = ?1, prior_status = status, updated_at = ?2
                 WHERE id = ?3 AND tenant_id = ?4 AND version = ?5 AND status != ?1",
                libsql::params![
                    DocumentStatus::Regenerating.as_str(),
                    Utc::now().to_rfc3339(),
                    id,
                    caller.tenant_id.as_str(),
                    expected
                ],
            )
            .await?;

        let doc = self.get_generated_document(caller, id).await?;
        if affected == 0 {
            let conflict = if doc.version == expected {
                Conflict::InFlight
            } else {
                Conflict::VersionMismatch {
                    expected,
                    current: doc.version,
                }
            };
            tracing::debug!(document_id = id, %conflict, "regeneration claim rejected");
            return Err(conflict.into());
        }
        Ok(doc)
    }

    /// Persist the regenerated version and release the claim.
    ///
    /// `claimed_version` is the version returned by
    /// [`Self::begin_regeneration`], or 0 for a slot from
    /// [`Self::claim_generated_document`]. The new version is
    /// `claimed_version + 1` and its blob must already be stored under that
    /// version's key.
    pub async fn complete_regeneration(
        &self,
        caller: &Caller,
        id: &str,
        claimed_version: i64,
        revision: &DocumentRevision,
    ) -> Result<GeneratedDocument, DatabaseError> {
        revision.check_status()?;
        let current = self.get_generated_document(caller, id).await?;
        let next_version = claimed_version + 1;
        let storage_key = generated_document_key(
            &caller.tenant_id,
            &current.deal_id,
            current.doc_type,
            next_version,
        );
        let now = Utc::now().to_rfc3339();
        let compliance_issues = to_json_text(&revision.compliance_issues)?;
        let regulatory_checks = to_json_text(&revision.regulatory_checks)?;
        let verification_issues = to_json_text(&revision.verification_issues)?;

        let conn = self.db().conn().await;
        let tx = conn.transaction().await?;
        let result = async {
            let affected = tx
                .execute(
                    "UPDATE generated_documents
                     SET version = ?1, storage_key = ?2, status = ?3, prior_status = NULL,
                         compliance_status = ?4, compliance_issues = ?5, regulatory_checks = ?6,
                         verification_status = ?7, verification_issues = ?8, review_cycles = ?9,
                         updated_at = ?10
                     WHERE id = ?11 AND tenant_id = ?12 AND version = ?13 AND status = ?14",
                    libsql::params![
                        next_version,
                        storage_key.as_str(),
                        revision.status.as_str(),
                        revision.compliance_status.as_str(),
                        compliance_issues.as_str(),
                        regulatory_checks.as_str(),
                        revision.verification_status.as_str(),
                        verification_issues.as_str(),
                        i64::from(revision.review_cycles),
                        now.as_str(),
                        id,
                        caller.tenant_id.as_str(),
                        claimed_version,
                        DocumentStatus::Regenerating.as_str()
                    ],
                )
                .await?;
            if affected == 0 {
                return Err(DatabaseError::InvalidState(format!(
                    "document {id} is not held for regeneration at version {claimed_version}"
                )));
            }
            tx.execute(
                &format!(
                    "INSERT INTO document_versions ({VERSION_COLS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                libsql::params![
                    id,
                    next_version,
                    storage_key.as_str(),
                    revision.compliance_status.as_str(),
                    compliance_issues.as_str(),
                    regulatory_checks.as_str(),
                    revision.verification_status.as_str(),
                    verification_issues.as_str(),
                    i64::from(revision.review_cycles),
                    revision.feedback.as_deref(),
                    now.as_str()
                ],
            )
            .await?;
            Ok::<_, DatabaseError>(())
        }
        .await;
        finish_tx(tx, result).await?;
        drop(conn);

        self.get_generated_document(caller, id).await
    }

    /// Release a claim without a new version, restoring the status the
    /// document had before [`Self::begin_regeneration`].
    pub async fn rollback_regeneration(
        &self,
        caller: &Caller,
        id: &str,
    ) -> Result<GeneratedDocument, DatabaseError> {
        let affected = self
            .db()
            .conn()
            .await
            .execute(
                "UPDATE generated_documents
                 SET status = COALESCE(prior_status, ?1), prior_status = NULL, updated_at = ?2
                 WHERE id = ?3 AND tenant_id = ?4 AND status = ?5",
                libsql::params![
                    DocumentStatus::NeedsReview.as_str(),
                    Utc::now().to_rfc3339(),
                    id,
                    caller.tenant_id.as_str(),
                    DocumentStatus::Regenerating.as_str()
                ],
            )
            .await?;
        let doc = self.get_generated_document(caller, id).await?;
        if affected == 0 {
            tracing::debug!(document_id = id, status = %doc.status, "nothing to roll back");
        }
        Ok(doc)
    }

    /// Reviewer status change (`reviewed`, `approved`, `needs_review`).
    ///
    /// `regenerating` is entered only through [`Self::begin_regeneration`]
    /// and left only through completion or rollback.
    pub async fn transition_generated_document(
        &self,
        caller: &Caller,
        id: &str,
        next: DocumentStatus,
    ) -> Result<GeneratedDocument, DatabaseError> {
        let doc = self.get_generated_document(caller, id).await?;
        if doc.status == DocumentStatus::Regenerating {
            return Err(Conflict::InFlight.into());
        }
        if next == DocumentStatus::Regenerating || !doc.status.can_transition_to(next) {
            return Err(DatabaseError::InvalidState(format!(
                "Cannot transition document {id} from {} to {next}",
                doc.status
            )));
        }
        let affected = self
            .db()
            .conn()
            .await
            .execute(
                "UPDATE generated_documents SET status = ?1, updated_at = ?2
                 WHERE id = ?3 AND tenant_id = ?4 AND status = ?5",
                libsql::params![
                    next.as_str(),
                    Utc::now().to_rfc3339(),
                    id,
                    caller.tenant_id.as_str(),
                    doc.status.as_str()
                ],
            )
            .await?;
        if affected == 0 {
            let current = self.get_generated_document(caller, id).await?;
            return Err(Conflict::StatusChanged {
                expected: doc.status.as_str().to_string(),
                current: current.status.as_str().to_string(),
            }
            .into());
        }
        self.get_generated_document(caller, id).await
    }
}
