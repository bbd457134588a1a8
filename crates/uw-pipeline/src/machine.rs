//! The deal pipeline: stage driver and operator operations.
//!
//! ```text
//! run ──▶ uploaded ─▶ processing_ocr ─▶ classifying ─▶ extracting ─▶ verifying
//!                                                                     │   ▲
//!                                                          blocking ──▼   │ resolved
//!                                                                   resolving
//!         verifying ─▶ analyzing ─▶ structuring ─▶ generating_docs ─▶ generating_memo
//!                                                               ─▶ complete | needs_review
//! ```
//!
//! Each stage does its work, then moves the deal on with a compare-and-swap
//! from the stage it ran in. Stage work is idempotent: re-running a stage
//! skips sources and documents that already carry its output, and each
//! document is claimed before it is drafted, so two drivers racing on one
//! deal do the same work once and the loser stops with a conflict. A stage that fails for any other reason
//! parks the deal in `error` with the step recorded; [`Pipeline::restart`]
//! resumes from there.
//!
//! Every public operation is admitted by the [`RateLimiter`] before it
//! touches anything.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use uw_blob::BlobStore;
use uw_config::UwConfig;
use uw_core::audit_detail::{
    DocumentVersionDetail, IssueResolvedDetail, PipelineFailedDetail, RegenerationDetail,
    StatusChangedDetail,
};
use uw_core::entities::{
    AuditEntry, Deal, DocumentVersion, GeneratedDocument, SourceDocument, VerificationIssue,
};
use uw_core::enums::{
    AuditAction, DealStatus, DocumentStatus, EntityType, GeneratedDocType, OperationClass, Program,
    ResolutionStatus,
};
use uw_core::errors::CoreError;
use uw_core::identity::Caller;
use uw_core::keys::generated_document_key;
use uw_core::responses::{PipelineRunResponse, RegenerateResponse};
use uw_db::error::{Conflict, DatabaseError};
use uw_db::repos::audit::AuditFilter;
use uw_db::repos::generated_document::DocumentSlot;
use uw_db::repos::verification_issue::Resolution;
use uw_db::service::UwService;
use uw_db::updates::deal::{DealUpdate, DealUpdateBuilder};
use uw_llm::Generative;
use uw_rules::{Jurisdiction, RulesInput, Terms};
use uw_verify::{
    ReconciledRecord, Reconciler, VerificationEngine, VerifiedDataset, blocking_issues,
    can_leave_verification,
};

use crate::audit::AuditSink;
use crate::error::PipelineError;
use crate::generator::{Feedback, GenerationContext, Generator};
use crate::intake::IntakeService;
use crate::limiter::RateLimiter;

const MARKDOWN: &str = "text/markdown";

/// How long an unfinished document claim blocks other drivers.
const SLOT_LEASE: Duration = Duration::from_secs(15 * 60);

/// What a download hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadBody {
    /// Presigned URL; the caller fetches the bytes itself.
    Url(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub document_id: String,
    pub version: i64,
    pub storage_key: String,
    pub body: DownloadBody,
}

enum Step {
    Advanced(DealStatus),
    Paused,
}

/// Inputs shared by every document generated for one deal.
struct DealInputs {
    terms: Terms,
    dataset: VerifiedDataset,
    issues: Vec<VerificationIssue>,
    jurisdiction: &'static Jurisdiction,
}

impl DealInputs {
    fn context<'a>(&'a self, deal: &'a Deal, doc_type: GeneratedDocType) -> GenerationContext<'a> {
        GenerationContext {
            doc_type,
            deal_name: &deal.name,
            program: deal.program,
            jurisdiction: self.jurisdiction,
            dataset: &self.dataset,
            terms: &self.terms,
            verification_issues: &self.issues,
        }
    }
}

fn corrupt(what: &str, e: &serde_json::Error) -> PipelineError {
    PipelineError::Database(DatabaseError::Query(format!("{what}: {e}")))
}

/// Name the missing entity instead of a bare "no result".
fn found<T>(
    result: Result<T, DatabaseError>,
    entity_type: EntityType,
    id: &str,
) -> Result<T, PipelineError> {
    result.map_err(|e| match e {
        DatabaseError::NoResult => CoreError::NotFound {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        }
        .into(),
        other => other.into(),
    })
}

pub struct Pipeline {
    store: Arc<UwService>,
    blobs: BlobStore,
    intake: Arc<dyn IntakeService>,
    generator: Generator,
    limiter: Arc<RateLimiter>,
    audit: AuditSink,
    reconciler: Reconciler,
    engine: VerificationEngine,
    require_warn_resolution: bool,
}

impl Pipeline {
    /// Wire a pipeline from its collaborators and the loaded configuration.
    ///
    /// `generative` should already be wrapped in
    /// [`RetryingGenerative`](uw_llm::RetryingGenerative).
    #[must_use]
    pub fn new(
        store: Arc<UwService>,
        blobs: BlobStore,
        generative: Arc<dyn Generative>,
        intake: Arc<dyn IntakeService>,
        config: &UwConfig,
    ) -> Self {
        let audit = AuditSink::new(store.clone());
        Self {
            generator: Generator::new(
                generative,
                config.pipeline.max_compliance_cycles,
                config.llm.max_tokens,
                config.pipeline.review_max_tokens,
            ),
            limiter: Arc::new(RateLimiter::from_config(&config.rate_limit)),
            reconciler: Reconciler::from_config(&config.verification),
            engine: VerificationEngine::from_config(&config.verification),
            require_warn_resolution: config.pipeline.require_warn_resolution,
            store,
            blobs,
            intake,
            audit,
        }
    }

    /// Replace the limiter, e.g. with one on a manual clock.
    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub const fn audit(&self) -> &AuditSink {
        &self.audit
    }

    #[must_use]
    pub fn store(&self) -> &UwService {
        &self.store
    }

    fn admit(&self, caller: &Caller, class: OperationClass) -> Result<(), PipelineError> {
        self.limiter
            .check(class, &caller.rate_key())
            .map_err(|r| PipelineError::RateLimited {
                class: r.class,
                retry_after: r.retry_after,
            })
    }

    // -----------------------------------------------------------------------
    // Deals
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// `Validation` for a blank name or a jurisdiction without a rules table.
    pub async fn create_deal(
        &self,
        caller: &Caller,
        name: &str,
        program: Program,
        jurisdiction: &str,
    ) -> Result<Deal, PipelineError> {
        self.admit(caller, OperationClass::Write)?;
        Jurisdiction::lookup(jurisdiction).map_err(|e| PipelineError::Validation(e.to_string()))?;
        let deal = self
            .store
            .create_deal(caller, name, program, jurisdiction)
            .await?;
        tracing::info!(deal_id = %deal.id, %program, jurisdiction = %deal.jurisdiction, "deal created");
        self.audit.record_bare(
            caller,
            AuditAction::Created,
            Some((EntityType::Deal, &deal.id)),
        );
        Ok(deal)
    }

    /// # Errors
    ///
    /// `NotFound` if the deal does not exist for the caller's tenant.
    pub async fn get_deal(&self, caller: &Caller, deal_id: &str) -> Result<Deal, PipelineError> {
        self.admit(caller, OperationClass::Read)?;
        found(self.store.get_deal(caller, deal_id).await, EntityType::Deal, deal_id)
    }

    /// # Errors
    ///
    /// Database failures only.
    pub async fn list_deals(
        &self,
        caller: &Caller,
        status: Option<DealStatus>,
        limit: u32,
    ) -> Result<Vec<Deal>, PipelineError> {
        self.admit(caller, OperationClass::Read)?;
        Ok(self.store.list_deals(caller, status, limit).await?)
    }

    /// User edit of name, program or jurisdiction.
    ///
    /// # Errors
    ///
    /// `Validation` unless the deal is `uploaded` or `needs_review`, or if
    /// the new jurisdiction has no rules table.
    pub async fn edit_deal(
        &self,
        caller: &Caller,
        deal_id: &str,
        update: &DealUpdate,
    ) -> Result<Deal, PipelineError> {
        self.admit(caller, OperationClass::Write)?;
        if update.is_empty() {
            return Err(PipelineError::Validation("nothing to update".into()));
        }
        if let Some(code) = &update.jurisdiction {
            Jurisdiction::lookup(code).map_err(|e| PipelineError::Validation(e.to_string()))?;
        }
        let deal = found(
            self.store.edit_deal(caller, deal_id, update).await,
            EntityType::Deal,
            deal_id,
        )?;
        self.audit.record(
            caller,
            AuditAction::Updated,
            Some((EntityType::Deal, deal_id)),
            Some(update),
        );
        Ok(deal)
    }

    /// Soft delete.
    ///
    /// # Errors
    ///
    /// `NotFound` if the deal does not exist or is already deleted.
    pub async fn delete_deal(&self, caller: &Caller, deal_id: &str) -> Result<(), PipelineError> {
        self.admit(caller, OperationClass::Write)?;
        found(
            self.store.soft_delete_deal(caller, deal_id).await,
            EntityType::Deal,
            deal_id,
        )?;
        self.audit
            .record_bare(caller, AuditAction::Deleted, Some((EntityType::Deal, deal_id)));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sources
    // -----------------------------------------------------------------------

    /// Register an upload and store its bytes.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty file or a deal past `uploaded`; `Blob` if
    /// the bytes cannot be stored, in which case the row is removed again.
    pub async fn add_source(
        &self,
        caller: &Caller,
        deal_id: &str,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<SourceDocument, PipelineError> {
        self.admit(caller, OperationClass::Write)?;
        if bytes.is_empty() {
            return Err(PipelineError::Validation(format!("{filename} is empty")));
        }
        let deal = found(self.store.get_deal(caller, deal_id).await, EntityType::Deal, deal_id)?;
        if deal.status != DealStatus::Uploaded {
            return Err(PipelineError::Validation(format!(
                "sources can only be added while a deal is uploaded; deal {deal_id} is {}",
                deal.status
            )));
        }

        let doc = self
            .store
            .create_source_document(caller, deal_id, filename, content_type)
            .await?;
        if let Err(e) = self.blobs.put(&doc.storage_key, bytes, content_type).await {
            if let Err(cleanup) = self.store.delete_source_document(caller, &doc.id).await {
                tracing::warn!(source_id = %doc.id, error = %cleanup, "orphaned source row");
            }
            return Err(e.into());
        }

        tracing::info!(deal_id, source_id = %doc.id, filename, "source added");
        self.audit.record_bare(
            caller,
            AuditAction::Created,
            Some((EntityType::SourceDocument, &doc.id)),
        );
        Ok(doc)
    }

    /// # Errors
    ///
    /// `NotFound` if the deal does not exist.
    pub async fn list_sources(
        &self,
        caller: &Caller,
        deal_id: &str,
    ) -> Result<Vec<SourceDocument>, PipelineError> {
        self.admit(caller, OperationClass::Read)?;
        found(self.store.get_deal(caller, deal_id).await, EntityType::Deal, deal_id)?;
        Ok(self.store.list_source_documents(caller, deal_id).await?)
    }

    // -----------------------------------------------------------------------
    // Driving
    // -----------------------------------------------------------------------

    /// Drive the deal forward until it pauses for a human or finishes.
    ///
    /// Safe to call again at any point; a deal waiting in `resolving` or
    /// `needs_review` moves on only once its blocking items are cleared.
    ///
    /// # Errors
    ///
    /// `Validation` before any work for a deal in `error` or without
    /// sources. A stage failure is returned after the deal has been moved
    /// to `error`. `Conflict` if another driver moved the deal first.
    pub async fn run(
        &self,
        caller: &Caller,
        deal_id: &str,
    ) -> Result<PipelineRunResponse, PipelineError> {
        self.admit(caller, OperationClass::Pipeline)?;
        let deal = found(self.store.get_deal(caller, deal_id).await, EntityType::Deal, deal_id)?;
        match deal.status {
            DealStatus::Error => {
                let step = deal.error_step.map_or("unknown", DealStatus::as_str);
                return Err(PipelineError::Validation(format!(
                    "deal {deal_id} failed at {step}; restart it instead"
                )));
            }
            DealStatus::Uploaded => self.require_sources(caller, deal_id).await?,
            _ => {}
        }
        tracing::info!(deal_id, status = %deal.status, "pipeline run");
        self.drive(caller, deal_id, deal.status, deal.status).await
    }

    /// Leave `error` for the recorded step and drive on from there.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless the deal is in `error`; `Conflict` if it
    /// left `error` concurrently; stage failures as for [`Self::run`].
    pub async fn restart(
        &self,
        caller: &Caller,
        deal_id: &str,
    ) -> Result<PipelineRunResponse, PipelineError> {
        self.admit(caller, OperationClass::Pipeline)?;
        let deal = found(self.store.get_deal(caller, deal_id).await, EntityType::Deal, deal_id)?;
        let (DealStatus::Error, Some(step)) = (deal.status, deal.error_step) else {
            return Err(CoreError::InvalidTransition {
                entity_type: EntityType::Deal.to_string(),
                id: deal_id.to_string(),
                from: deal.status.to_string(),
                to: "restart".to_string(),
            }
            .into());
        };

        if self.store.restart_deal(caller, deal_id, step).await? == 0 {
            let current = self.store.get_deal(caller, deal_id).await?;
            return Err(Conflict::StatusChanged {
                expected: DealStatus::Error.as_str().to_string(),
                current: current.status.as_str().to_string(),
            }
            .into());
        }
        tracing::info!(deal_id, %step, "pipeline restarted");
        self.audit.record(
            caller,
            AuditAction::PipelineRestarted,
            Some((EntityType::Deal, deal_id)),
            Some(&StatusChangedDetail {
                from: DealStatus::Error.as_str().to_string(),
                to: step.as_str().to_string(),
                reason: deal.error_message,
            }),
        );
        self.drive(caller, deal_id, step, DealStatus::Error).await
    }

    async fn require_sources(&self, caller: &Caller, deal_id: &str) -> Result<(), PipelineError> {
        if self.store.list_source_documents(caller, deal_id).await?.is_empty() {
            return Err(PipelineError::Validation(format!(
                "deal {deal_id} has no source documents"
            )));
        }
        Ok(())
    }

    async fn drive(
        &self,
        caller: &Caller,
        deal_id: &str,
        from: DealStatus,
        started_from: DealStatus,
    ) -> Result<PipelineRunResponse, PipelineError> {
        let mut status = from;
        loop {
            match self.step(caller, deal_id, status).await {
                Ok(Step::Advanced(next)) => status = next,
                Ok(Step::Paused) => break,
                Err(e) => {
                    self.fail(caller, deal_id, status, &e).await;
                    return Err(e);
                }
            }
        }

        let deal = self.store.get_deal(caller, deal_id).await?;
        tracing::info!(deal_id, %started_from, status = %deal.status, "pipeline paused");
        Ok(PipelineRunResponse {
            pending_issues: self
                .store
                .list_verification_issues(caller, deal_id, Some(ResolutionStatus::Pending))
                .await?,
            documents: self.store.list_generated_documents(caller, deal_id).await?,
            deal,
            started_from,
        })
    }

    async fn step(
        &self,
        caller: &Caller,
        deal_id: &str,
        status: DealStatus,
    ) -> Result<Step, PipelineError> {
        match status {
            DealStatus::Uploaded => {
                self.require_sources(caller, deal_id).await?;
                self.advance(caller, deal_id, status, DealStatus::ProcessingOcr).await
            }
            DealStatus::ProcessingOcr => {
                self.ocr_sources(caller, deal_id).await?;
                self.advance(caller, deal_id, status, DealStatus::Classifying).await
            }
            DealStatus::Classifying => {
                self.classify_sources(caller, deal_id).await?;
                self.advance(caller, deal_id, status, DealStatus::Extracting).await
            }
            DealStatus::Extracting => {
                self.extract_sources(caller, deal_id).await?;
                self.advance(caller, deal_id, status, DealStatus::Verifying).await
            }
            DealStatus::Verifying => self.verify(caller, deal_id).await,
            DealStatus::Resolving => {
                let issues = self.store.list_verification_issues(caller, deal_id, None).await?;
                if can_leave_verification(&issues, self.require_warn_resolution) {
                    self.advance(caller, deal_id, status, DealStatus::Verifying).await
                } else {
                    Ok(Step::Paused)
                }
            }
            DealStatus::Analyzing => {
                self.analyze(caller, deal_id).await?;
                self.advance(caller, deal_id, status, DealStatus::Structuring).await
            }
            DealStatus::Structuring => {
                let deal = self.store.get_deal(caller, deal_id).await?;
                let plan: Vec<&str> = deal
                    .program
                    .document_plan()
                    .iter()
                    .map(|d| d.as_str())
                    .collect();
                tracing::info!(deal_id, program = %deal.program, ?plan, "document plan");
                self.advance(caller, deal_id, status, DealStatus::GeneratingDocs).await
            }
            DealStatus::GeneratingDocs => {
                let deal = self.store.get_deal(caller, deal_id).await?;
                let inputs = self.deal_inputs(caller, &deal).await?;
                for &doc_type in deal.program.document_plan() {
                    self.generate_missing(caller, &deal, &inputs, doc_type).await?;
                }
                self.advance(caller, deal_id, status, DealStatus::GeneratingMemo).await
            }
            DealStatus::GeneratingMemo => {
                let deal = self.store.get_deal(caller, deal_id).await?;
                let inputs = self.deal_inputs(caller, &deal).await?;
                self.generate_missing(caller, &deal, &inputs, GeneratedDocType::CreditMemo)
                    .await?;
                let docs = self.store.list_generated_documents(caller, deal_id).await?;
                let settled = docs.iter().all(|d| {
                    matches!(
                        d.status,
                        DocumentStatus::Generated | DocumentStatus::Reviewed | DocumentStatus::Approved
                    )
                });
                let next = if settled {
                    DealStatus::Complete
                } else {
                    DealStatus::NeedsReview
                };
                self.advance(caller, deal_id, status, next).await?;
                Ok(Step::Paused)
            }
            DealStatus::NeedsReview => {
                let docs = self.store.list_generated_documents(caller, deal_id).await?;
                let reviewed = !docs.is_empty()
                    && docs.iter().all(|d| {
                        matches!(d.status, DocumentStatus::Reviewed | DocumentStatus::Approved)
                    });
                if reviewed {
                    self.advance(caller, deal_id, status, DealStatus::Analyzing).await
                } else {
                    Ok(Step::Paused)
                }
            }
            DealStatus::Complete | DealStatus::Error => Ok(Step::Paused),
        }
    }

    async fn advance(
        &self,
        caller: &Caller,
        deal_id: &str,
        from: DealStatus,
        to: DealStatus,
    ) -> Result<Step, PipelineError> {
        if !from.can_transition_to(to) {
            return Err(CoreError::InvalidTransition {
                entity_type: EntityType::Deal.to_string(),
                id: deal_id.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            }
            .into());
        }
        self.store.transition_deal(caller, deal_id, from, to).await?;
        tracing::info!(deal_id, %from, %to, "deal advanced");
        self.audit.record(
            caller,
            AuditAction::StatusChanged,
            Some((EntityType::Deal, deal_id)),
            Some(&StatusChangedDetail {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: None,
            }),
        );
        Ok(Step::Advanced(to))
    }

    async fn fail(&self, caller: &Caller, deal_id: &str, step: DealStatus, err: &PipelineError) {
        if err.is_conflict() {
            tracing::info!(deal_id, %step, error = %err, "another driver moved the deal");
            return;
        }
        if !step.can_transition_to(DealStatus::Error) {
            return;
        }
        let message = err.to_string();
        tracing::error!(deal_id, %step, error = %message, "pipeline stage failed");
        match self
            .store
            .record_deal_error(caller, deal_id, step, &message)
            .await
        {
            Ok(0) => {
                tracing::warn!(deal_id, %step, "deal left the stage before its failure was recorded");
            }
            Ok(_) => self.audit.record(
                caller,
                AuditAction::PipelineFailed,
                Some((EntityType::Deal, deal_id)),
                Some(&PipelineFailedDetail {
                    step: step.as_str().to_string(),
                    message,
                }),
            ),
            Err(e) => tracing::error!(deal_id, error = %e, "could not record pipeline failure"),
        }
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    async fn ocr_sources(&self, caller: &Caller, deal_id: &str) -> Result<(), PipelineError> {
        for doc in self.store.list_source_documents(caller, deal_id).await? {
            if doc.ocr_text.is_some() {
                continue;
            }
            let bytes = self.blobs.get(&doc.storage_key).await?;
            let out = self.intake.ocr(&doc, &bytes).await?;
            self.store
                .record_ocr(caller, &doc.id, &out.text, &out.fields)
                .await?;
            tracing::debug!(deal_id, source_id = %doc.id, "ocr recorded");
        }
        Ok(())
    }

    async fn classify_sources(&self, caller: &Caller, deal_id: &str) -> Result<(), PipelineError> {
        for doc in self.store.list_source_documents(caller, deal_id).await? {
            if doc.is_classified() {
                continue;
            }
            let text = doc.ocr_text.as_deref().unwrap_or_default();
            let verdict = self.intake.classify(&doc, text).await?;
            self.store
                .record_classification(caller, &doc.id, verdict.doc_type, verdict.confidence)
                .await?;
            tracing::debug!(
                deal_id,
                source_id = %doc.id,
                doc_type = %verdict.doc_type,
                confidence = verdict.confidence,
                "source classified"
            );
        }
        Ok(())
    }

    async fn extract_sources(&self, caller: &Caller, deal_id: &str) -> Result<(), PipelineError> {
        for doc in self.store.list_source_documents(caller, deal_id).await? {
            let Some(doc_type) = doc.doc_type else {
                return Err(PipelineError::Validation(format!(
                    "source {} was never classified",
                    doc.id
                )));
            };
            let model = match &doc.model_extraction {
                Some(stored) => stored.clone(),
                None => {
                    let text = doc.ocr_text.as_deref().unwrap_or_default();
                    let extracted = self.intake.extract(&doc, doc_type, text).await?;
                    if self
                        .store
                        .record_model_extraction(caller, &doc.id, &extracted)
                        .await?
                    {
                        extracted
                    } else {
                        // Another driver got there first; reconcile what it stored.
                        self.store
                            .get_source_document(caller, &doc.id)
                            .await?
                            .model_extraction
                            .unwrap_or(extracted)
                    }
                }
            };
            let ocr = doc
                .ocr_extraction
                .clone()
                .unwrap_or_else(|| Value::Object(Map::new()));
            let record = self.reconciler.reconcile(&ocr, &model);
            let stored = record
                .to_json()
                .map_err(|e| corrupt("reconciled record", &e))?;
            self.store.record_reconciled(caller, &doc.id, &stored).await?;
            tracing::debug!(
                deal_id,
                source_id = %doc.id,
                fields = record.fields.len(),
                disputed = record.disagreements().count(),
                "source reconciled"
            );
        }
        Ok(())
    }

    async fn verify(&self, caller: &Caller, deal_id: &str) -> Result<Step, PipelineError> {
        let mut records = Vec::new();
        for doc in self.store.list_source_documents(caller, deal_id).await? {
            let (Some(doc_type), Some(stored)) = (doc.doc_type, doc.reconciled.as_ref()) else {
                continue;
            };
            let record = ReconciledRecord::from_json(stored)
                .map_err(|e| corrupt(&format!("reconciled record of {}", doc.id), &e))?;
            records.push((doc_type, record));
        }

        // Corrections go in first so a corrected figure is checked as corrected;
        // one that still fails reopens its issue.
        let mut dataset = VerifiedDataset::from_records(records.iter().map(|(t, r)| (*t, r)));
        let prior = self.store.list_verification_issues(caller, deal_id, None).await?;
        let corrected = dataset.apply_corrections(&prior);

        let report = self.engine.verify(&dataset, &records);
        let raised = self
            .store
            .insert_verification_issues(caller, deal_id, &report.issues)
            .await?;
        let issues = self.store.list_verification_issues(caller, deal_id, None).await?;
        tracing::info!(
            deal_id,
            checks = report.checks.len(),
            raised,
            corrected,
            verdict = %report.status(),
            "verification finished"
        );

        self.store
            .update_deal(
                caller,
                deal_id,
                &DealUpdateBuilder::new()
                    .verified_data(Some(dataset.to_json()))
                    .build(),
            )
            .await?;

        if can_leave_verification(&issues, self.require_warn_resolution) {
            return self
                .advance(caller, deal_id, DealStatus::Verifying, DealStatus::Analyzing)
                .await;
        }
        let blocking = blocking_issues(&issues, self.require_warn_resolution).len();
        tracing::info!(deal_id, blocking, "waiting for issue resolution");
        self.advance(caller, deal_id, DealStatus::Verifying, DealStatus::Resolving)
            .await?;
        Ok(Step::Paused)
    }

    async fn analyze(&self, caller: &Caller, deal_id: &str) -> Result<(), PipelineError> {
        let deal = self.store.get_deal(caller, deal_id).await?;
        let dataset = deal
            .verified_data
            .as_ref()
            .map(VerifiedDataset::from_json)
            .unwrap_or_default();
        let input = RulesInput::from_dataset(&dataset)?;
        let terms = uw_rules::compute(&input, deal.program, &deal.jurisdiction)?;
        tracing::info!(
            deal_id,
            interest_rate = %terms.interest_rate,
            loan_amount = %terms.loan_amount,
            capped = terms.rate_capped(),
            "terms computed"
        );
        let stored = terms.to_json().map_err(|e| corrupt("terms", &e))?;
        self.store
            .update_deal(
                caller,
                deal_id,
                &DealUpdateBuilder::new().terms(Some(stored)).build(),
            )
            .await?;
        Ok(())
    }

    async fn deal_inputs(&self, caller: &Caller, deal: &Deal) -> Result<DealInputs, PipelineError> {
        let stored = deal.terms.as_ref().ok_or_else(|| {
            PipelineError::Validation(format!("deal {} has no computed terms", deal.id))
        })?;
        Ok(DealInputs {
            terms: Terms::from_json(stored).map_err(|e| corrupt("stored terms", &e))?,
            dataset: deal
                .verified_data
                .as_ref()
                .map(VerifiedDataset::from_json)
                .unwrap_or_default(),
            issues: self
                .store
                .list_verification_issues(caller, &deal.id, None)
                .await?,
            jurisdiction: Jurisdiction::lookup(&deal.jurisdiction)?,
        })
    }

    /// Generate version 1 of `doc_type` unless the deal already has it.
    ///
    /// The slot is claimed before the model is called, so a second driver
    /// stops with `Conflict` instead of drafting the same document.
    async fn generate_missing(
        &self,
        caller: &Caller,
        deal: &Deal,
        inputs: &DealInputs,
        doc_type: GeneratedDocType,
    ) -> Result<GeneratedDocument, PipelineError> {
        let slot = match self
            .store
            .claim_generated_document(caller, &deal.id, doc_type, SLOT_LEASE)
            .await?
        {
            DocumentSlot::Existing(existing) => {
                tracing::debug!(deal_id = %deal.id, %doc_type, "document exists; skipped");
                return Ok(existing);
            }
            DocumentSlot::Claimed(slot) => slot,
        };

        let doc = match self.generate_first_version(caller, deal, inputs, &slot).await {
            Ok(doc) => doc,
            Err(e) => {
                if let Err(release) = self
                    .store
                    .release_generated_document_claim(caller, &slot.id)
                    .await
                {
                    tracing::error!(document_id = %slot.id, error = %release, "document claim not released");
                }
                return Err(e);
            }
        };

        tracing::info!(
            deal_id = %deal.id,
            document_id = %doc.id,
            %doc_type,
            cycles = doc.review_cycles,
            status = %doc.status,
            "document generated"
        );
        self.audit.record(
            caller,
            AuditAction::DocumentGenerated,
            Some((EntityType::GeneratedDocument, &doc.id)),
            Some(&DocumentVersionDetail {
                doc_type: doc_type.as_str().to_string(),
                version: doc.version,
                review_cycles: doc.review_cycles,
                needs_review: doc.status == DocumentStatus::NeedsReview,
            }),
        );
        Ok(doc)
    }

    async fn generate_first_version(
        &self,
        caller: &Caller,
        deal: &Deal,
        inputs: &DealInputs,
        slot: &GeneratedDocument,
    ) -> Result<GeneratedDocument, PipelineError> {
        let generated = self
            .generator
            .produce(inputs.context(deal, slot.doc_type), Feedback::default())
            .await?;
        let key = generated_document_key(&caller.tenant_id, &deal.id, slot.doc_type, slot.version + 1);
        self.blobs
            .put(&key, generated.body.into_bytes(), MARKDOWN)
            .await?;
        Ok(self
            .store
            .complete_regeneration(caller, &slot.id, slot.version, &generated.revision)
            .await?)
    }

    // -----------------------------------------------------------------------
    // Verification issues
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// `Validation` if the issue is not pending or the resolution is
    /// malformed; `NotFound` for an unknown issue.
    pub async fn resolve_issue(
        &self,
        caller: &Caller,
        issue_id: &str,
        resolution: &Resolution,
    ) -> Result<VerificationIssue, PipelineError> {
        self.admit(caller, OperationClass::Write)?;
        let issue = found(
            self.store
                .resolve_verification_issue(caller, issue_id, resolution)
                .await,
            EntityType::VerificationIssue,
            issue_id,
        )?;
        tracing::info!(
            deal_id = %issue.deal_id,
            issue_id,
            resolution = %issue.status,
            field = %issue.field_path,
            "issue resolved"
        );
        self.audit.record(
            caller,
            AuditAction::IssueResolved,
            Some((EntityType::VerificationIssue, issue_id)),
            Some(&IssueResolvedDetail {
                resolution: issue.status.as_str().to_string(),
                corrected_value: issue.corrected_value.clone(),
                note: issue.resolution_note.clone(),
            }),
        );
        Ok(issue)
    }

    /// # Errors
    ///
    /// `NotFound` if the deal does not exist.
    pub async fn list_issues(
        &self,
        caller: &Caller,
        deal_id: &str,
        status: Option<ResolutionStatus>,
    ) -> Result<Vec<VerificationIssue>, PipelineError> {
        self.admit(caller, OperationClass::Read)?;
        found(self.store.get_deal(caller, deal_id).await, EntityType::Deal, deal_id)?;
        Ok(self
            .store
            .list_verification_issues(caller, deal_id, status)
            .await?)
    }

    // -----------------------------------------------------------------------
    // Generated documents
    // -----------------------------------------------------------------------

    /// Regenerate one document with optional reviewer notes.
    ///
    /// The document is claimed with a compare-and-swap on
    /// `expected_version` (or its current version when `None`). Any failure
    /// after the claim restores the status the document had before and
    /// leaves its version untouched.
    ///
    /// # Errors
    ///
    /// `Conflict` when the version token is stale or another regeneration
    /// holds the document; provider, storage and database failures after
    /// rollback.
    pub async fn regenerate(
        &self,
        caller: &Caller,
        document_id: &str,
        expected_version: Option<i64>,
        notes: Option<String>,
    ) -> Result<RegenerateResponse, PipelineError> {
        self.admit(caller, OperationClass::Pipeline)?;
        let target = Some((EntityType::GeneratedDocument, document_id));

        let claimed = match self
            .store
            .begin_regeneration(caller, document_id, expected_version)
            .await
        {
            Ok(doc) => doc,
            Err(DatabaseError::Conflict(conflict)) => {
                tracing::info!(document_id, %conflict, "regeneration rejected");
                self.audit.record(
                    caller,
                    AuditAction::RegenerationConflict,
                    target,
                    Some(&RegenerationDetail {
                        expected_version,
                        reason: conflict.to_string(),
                    }),
                );
                return Err(conflict.into());
            }
            Err(e) => return found(Err(e), EntityType::GeneratedDocument, document_id),
        };

        match self.regenerate_claimed(caller, &claimed, notes).await {
            Ok(doc) => {
                tracing::info!(
                    document_id,
                    version = doc.version,
                    cycles = doc.review_cycles,
                    status = %doc.status,
                    "document regenerated"
                );
                let needs_review = doc.status == DocumentStatus::NeedsReview;
                self.audit.record(
                    caller,
                    AuditAction::DocumentRegenerated,
                    target,
                    Some(&DocumentVersionDetail {
                        doc_type: doc.doc_type.as_str().to_string(),
                        version: doc.version,
                        review_cycles: doc.review_cycles,
                        needs_review,
                    }),
                );
                Ok(RegenerateResponse {
                    document: doc,
                    needs_review,
                })
            }
            Err(e) => {
                match self.store.rollback_regeneration(caller, document_id).await {
                    Ok(doc) => {
                        tracing::warn!(document_id, status = %doc.status, error = %e, "regeneration rolled back");
                    }
                    Err(rollback) => {
                        tracing::error!(document_id, error = %rollback, "regeneration rollback failed");
                    }
                }
                self.audit.record(
                    caller,
                    AuditAction::RegenerationRolledBack,
                    target,
                    Some(&RegenerationDetail {
                        expected_version: Some(claimed.version),
                        reason: e.to_string(),
                    }),
                );
                Err(e)
            }
        }
    }

    async fn regenerate_claimed(
        &self,
        caller: &Caller,
        claimed: &GeneratedDocument,
        notes: Option<String>,
    ) -> Result<GeneratedDocument, PipelineError> {
        let deal = self.store.get_deal(caller, &claimed.deal_id).await?;
        let inputs = self.deal_inputs(caller, &deal).await?;
        let history = self
            .store
            .list_document_versions(caller, &claimed.id)
            .await?;
        let feedback = Feedback::from_history(claimed, &history, notes);

        let generated = self
            .generator
            .produce(inputs.context(&deal, claimed.doc_type), feedback)
            .await?;

        let next_version = claimed.version + 1;
        let key = generated_document_key(&caller.tenant_id, &deal.id, claimed.doc_type, next_version);
        self.blobs
            .put(&key, generated.body.into_bytes(), MARKDOWN)
            .await?;

        match self
            .store
            .complete_regeneration(caller, &claimed.id, claimed.version, &generated.revision)
            .await
        {
            Ok(doc) => Ok(doc),
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&key).await {
                    tracing::warn!(key, error = %cleanup, "orphaned document blob");
                }
                Err(e.into())
            }
        }
    }

    /// Reviewer decision on a document: `reviewed`, `approved` or back to
    /// `needs_review`.
    ///
    /// # Errors
    ///
    /// `Validation` for any other target or a transition the document's
    /// status does not allow; `Conflict` while the document is being
    /// generated or regenerated.
    pub async fn review_document(
        &self,
        caller: &Caller,
        document_id: &str,
        next: DocumentStatus,
    ) -> Result<GeneratedDocument, PipelineError> {
        self.admit(caller, OperationClass::Write)?;
        if !matches!(
            next,
            DocumentStatus::Reviewed | DocumentStatus::Approved | DocumentStatus::NeedsReview
        ) {
            return Err(PipelineError::Validation(format!(
                "{next} is not a review decision"
            )));
        }
        let before = found(
            self.store.get_generated_document(caller, document_id).await,
            EntityType::GeneratedDocument,
            document_id,
        )?;
        let doc = self
            .store
            .transition_generated_document(caller, document_id, next)
            .await?;
        self.audit.record(
            caller,
            AuditAction::StatusChanged,
            Some((EntityType::GeneratedDocument, document_id)),
            Some(&StatusChangedDetail {
                from: before.status.as_str().to_string(),
                to: next.as_str().to_string(),
                reason: None,
            }),
        );
        Ok(doc)
    }

    /// # Errors
    ///
    /// `NotFound` if the deal does not exist.
    pub async fn list_documents(
        &self,
        caller: &Caller,
        deal_id: &str,
    ) -> Result<Vec<GeneratedDocument>, PipelineError> {
        self.admit(caller, OperationClass::Read)?;
        found(self.store.get_deal(caller, deal_id).await, EntityType::Deal, deal_id)?;
        Ok(self.store.list_generated_documents(caller, deal_id).await?)
    }

    /// Version history, oldest first.
    ///
    /// # Errors
    ///
    /// `NotFound` if the document does not exist.
    pub async fn list_versions(
        &self,
        caller: &Caller,
        document_id: &str,
    ) -> Result<Vec<DocumentVersion>, PipelineError> {
        self.admit(caller, OperationClass::Read)?;
        found(
            self.store.list_document_versions(caller, document_id).await,
            EntityType::GeneratedDocument,
            document_id,
        )
    }

    /// Fetch the current version, or `version` if given, as a presigned URL
    /// when the store can sign and as bytes otherwise.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown document or version.
    pub async fn download(
        &self,
        caller: &Caller,
        document_id: &str,
        version: Option<i64>,
    ) -> Result<Download, PipelineError> {
        self.admit(caller, OperationClass::Read)?;
        let doc = found(
            self.store.get_generated_document(caller, document_id).await,
            EntityType::GeneratedDocument,
            document_id,
        )?;
        let (version, storage_key) = match version {
            None => (doc.version, doc.storage_key),
            Some(v) => {
                let row = found(
                    self.store.get_document_version(caller, document_id, v).await,
                    EntityType::GeneratedDocument,
                    &format!("{document_id} v{v}"),
                )?;
                (row.version, row.storage_key)
            }
        };

        let body = match self.blobs.presigned_url(&storage_key, None).await? {
            Some(url) => DownloadBody::Url(url),
            None => DownloadBody::Bytes(self.blobs.get(&storage_key).await?),
        };
        self.audit.record(
            caller,
            AuditAction::Downloaded,
            Some((EntityType::GeneratedDocument, document_id)),
            Some(&serde_json::json!({ "version": version })),
        );
        Ok(Download {
            document_id: document_id.to_string(),
            version,
            storage_key,
            body,
        })
    }

    // -----------------------------------------------------------------------
    // Audit
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Database failures only.
    pub async fn audit_log(
        &self,
        caller: &Caller,
        filter: &AuditFilter,
    ) -> Result<Vec<AuditEntry>, PipelineError> {
        self.admit(caller, OperationClass::Read)?;
        Ok(self.store.query_audit(caller, filter).await?)
    }
}
