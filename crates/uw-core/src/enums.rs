//! Status enums, document types, and audit vocabulary for Underwrite.
//!
//! All enums use `snake_case` serialization via `#[serde(rename_all = "snake_case")]`.
//! Status enums with state machines provide `allowed_next_states()`; the
//! pipeline rejects any transition that is not listed there.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// DealStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a deal as it moves through the document pipeline.
///
/// ```text
/// uploaded → processing_ocr → classifying → extracting → verifying ⇄ resolving
///   → analyzing → structuring → generating_docs → generating_memo
///   → needs_review | complete
///
/// any non-terminal state → error → (the recorded error step)
/// needs_review → analyzing
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    Uploaded,
    ProcessingOcr,
    Classifying,
    Extracting,
    Verifying,
    Resolving,
    Analyzing,
    Structuring,
    GeneratingDocs,
    GeneratingMemo,
    NeedsReview,
    Complete,
    Error,
}

impl DealStatus {
    /// Every processing stage a failed deal may be restarted from.
    pub const RESTARTABLE: &'static [Self] = &[
        Self::Uploaded,
        Self::ProcessingOcr,
        Self::Classifying,
        Self::Extracting,
        Self::Verifying,
        Self::Resolving,
        Self::Analyzing,
        Self::Structuring,
        Self::GeneratingDocs,
        Self::GeneratingMemo,
    ];

    /// Valid next states from the current state.
    ///
    /// `Error` lists every restartable stage; the state machine additionally
    /// requires the target to equal the deal's recorded `error_step`.
    #[must_use]
    pub const fn allowed_next_states(self) -> &'static [Self] {
        match self {
            Self::Uploaded => &[Self::ProcessingOcr, Self::Error],
            Self::ProcessingOcr => &[Self::Classifying, Self::Error],
            Self::Classifying => &[Self::Extracting, Self::Error],
            Self::Extracting => &[Self::Verifying, Self::Error],
            Self::Verifying => &[
                Self::Verifying,
                Self::Resolving,
                Self::Analyzing,
                Self::Error,
            ],
            Self::Resolving => &[Self::Verifying, Self::Error],
            Self::Analyzing => &[Self::Structuring, Self::Error],
            Self::Structuring => &[Self::GeneratingDocs, Self::Error],
            Self::GeneratingDocs => &[Self::GeneratingMemo, Self::Error],
            Self::GeneratingMemo => &[Self::NeedsReview, Self::Complete, Self::Error],
            Self::NeedsReview => &[Self::Analyzing, Self::Error],
            Self::Complete => &[],
            Self::Error => Self::RESTARTABLE,
        }
    }

    /// Check whether transitioning to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_next_states().contains(&next)
    }

    /// `Complete` is final. `Error` is terminal until an explicit retry.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Whether the user edit path may modify a deal in this status.
    #[must_use]
    pub const fn is_editable(self) -> bool {
        matches!(self, Self::Uploaded | Self::NeedsReview)
    }

    /// Position of the stage in the forward pipeline order.
    ///
    /// Used to decide whether a stage has already been passed. `Error` has no
    /// position.
    #[must_use]
    pub const fn stage_index(self) -> Option<u8> {
        match self {
            Self::Uploaded => Some(0),
            Self::ProcessingOcr => Some(1),
            Self::Classifying => Some(2),
            Self::Extracting => Some(3),
            Self::Verifying => Some(4),
            Self::Resolving => Some(5),
            Self::Analyzing => Some(6),
            Self::Structuring => Some(7),
            Self::GeneratingDocs => Some(8),
            Self::GeneratingMemo => Some(9),
            Self::NeedsReview => Some(10),
            Self::Complete => Some(11),
            Self::Error => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::ProcessingOcr => "processing_ocr",
            Self::Classifying => "classifying",
            Self::Extracting => "extracting",
            Self::Verifying => "verifying",
            Self::Resolving => "resolving",
            Self::Analyzing => "analyzing",
            Self::Structuring => "structuring",
            Self::GeneratingDocs => "generating_docs",
            Self::GeneratingMemo => "generating_memo",
            Self::NeedsReview => "needs_review",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// DocumentStatus
// ---------------------------------------------------------------------------

/// Status of a generated document.
///
/// ```text
/// generated → reviewed → approved
///           → needs_review → reviewed
/// {generated, needs_review, reviewed, approved} → regenerating
/// regenerating → generated | needs_review          (success)
///              → <prior status>                   (rollback)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Generated,
    NeedsReview,
    Reviewed,
    Approved,
    Regenerating,
}

impl DocumentStatus {
    /// Valid next states from the current state.
    #[must_use]
    pub const fn allowed_next_states(self) -> &'static [Self] {
        match self {
            Self::Generated => &[
                Self::NeedsReview,
                Self::Reviewed,
                Self::Approved,
                Self::Regenerating,
            ],
            Self::NeedsReview => &[Self::Reviewed, Self::Regenerating],
            Self::Reviewed => &[Self::Approved, Self::Regenerating],
            Self::Approved => &[Self::Regenerating],
            Self::Regenerating => &[
                Self::Generated,
                Self::NeedsReview,
                Self::Reviewed,
                Self::Approved,
            ],
        }
    }

    /// Check whether transitioning to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_next_states().contains(&next)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::NeedsReview => "needs_review",
            Self::Reviewed => "reviewed",
            Self::Approved => "approved",
            Self::Regenerating => "regenerating",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ComplianceStatus / VerificationStatus
// ---------------------------------------------------------------------------

/// Outcome of the compliance review for one document version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Passed,
    Failed,
    NeedsReview,
}

impl ComplianceStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::NeedsReview => "needs_review",
        }
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate verification state carried on a generated document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Passed,
    Warnings,
    Failed,
}

impl VerificationStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Warnings => "warnings",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Verification vocabulary
// ---------------------------------------------------------------------------

/// Family of verification check that produced an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    Math,
    CrossDoc,
    ExtractionDisagreement,
}

impl CheckType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Math => "math",
            Self::CrossDoc => "cross_doc",
            Self::ExtractionDisagreement => "extraction_disagreement",
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a verification finding. Ordered: `Info < Warn < Fail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Fail,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human resolution state of a verification issue.
///
/// ```text
/// pending → confirmed
///         → corrected
///         → noted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Pending,
    Confirmed,
    Corrected,
    Noted,
}

impl ResolutionStatus {
    /// Valid next states from the current state.
    #[must_use]
    pub const fn allowed_next_states(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Confirmed, Self::Corrected, Self::Noted],
            Self::Confirmed | Self::Corrected | Self::Noted => &[],
        }
    }

    /// Check whether transitioning to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_next_states().contains(&next)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Corrected => "corrected",
            Self::Noted => "noted",
        }
    }
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which extraction produced a raw field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    /// Layout/OCR extraction (textract-style key/value output).
    Ocr,
    /// Model extraction over the OCR text.
    Model,
}

impl ExtractionSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ocr => "ocr",
            Self::Model => "model",
        }
    }
}

impl fmt::Display for ExtractionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of a reconciled field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Agreed,
    Disagreement,
    OcrOnly,
    ModelOnly,
}

impl Provenance {
    /// Whether only one extraction source produced the field.
    #[must_use]
    pub const fn is_single_source(self) -> bool {
        matches!(self, Self::OcrOnly | Self::ModelOnly)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Agreed => "agreed",
            Self::Disagreement => "disagreement",
            Self::OcrOnly => "ocr_only",
            Self::ModelOnly => "model_only",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Compliance vocabulary
// ---------------------------------------------------------------------------

/// Severity of a compliance finding on a generated document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ComplianceSeverity {
    /// High and critical findings fail the review.
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ComplianceSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Document types
// ---------------------------------------------------------------------------

/// Classification of an uploaded source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceDocType {
    LoanApplication,
    TaxReturn,
    BankStatement,
    OperatingStatement,
    RentRoll,
    Appraisal,
    BalanceSheet,
    CreditReport,
    FundStatement,
    Other,
}

impl SourceDocType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoanApplication => "loan_application",
            Self::TaxReturn => "tax_return",
            Self::BankStatement => "bank_statement",
            Self::OperatingStatement => "operating_statement",
            Self::RentRoll => "rent_roll",
            Self::Appraisal => "appraisal",
            Self::BalanceSheet => "balance_sheet",
            Self::CreditReport => "credit_report",
            Self::FundStatement => "fund_statement",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for SourceDocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of document produced by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GeneratedDocType {
    TermSheet,
    LoanAgreement,
    PromissoryNote,
    PrivatePlacementMemorandum,
    SubscriptionAgreement,
    ComplianceReport,
    CreditMemo,
}

impl GeneratedDocType {
    /// Human title used in prompts and headings.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::TermSheet => "Term Sheet",
            Self::LoanAgreement => "Loan Agreement",
            Self::PromissoryNote => "Promissory Note",
            Self::PrivatePlacementMemorandum => "Private Placement Memorandum",
            Self::SubscriptionAgreement => "Subscription Agreement",
            Self::ComplianceReport => "Compliance Report",
            Self::CreditMemo => "Credit Memo",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TermSheet => "term_sheet",
            Self::LoanAgreement => "loan_agreement",
            Self::PromissoryNote => "promissory_note",
            Self::PrivatePlacementMemorandum => "private_placement_memorandum",
            Self::SubscriptionAgreement => "subscription_agreement",
            Self::ComplianceReport => "compliance_report",
            Self::CreditMemo => "credit_memo",
        }
    }
}

impl fmt::Display for GeneratedDocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Program
// ---------------------------------------------------------------------------

/// Financing program a deal is structured under. Selects the rules table and
/// the generated document plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Program {
    Conventional,
    Bridge,
    Sba7a,
    Syndication,
}

impl Program {
    /// Documents produced during the `generating_docs` stage.
    ///
    /// The memo produced during `generating_memo` is not part of this list.
    #[must_use]
    pub const fn document_plan(self) -> &'static [GeneratedDocType] {
        match self {
            Self::Conventional | Self::Bridge | Self::Sba7a => &[
                GeneratedDocType::TermSheet,
                GeneratedDocType::LoanAgreement,
                GeneratedDocType::PromissoryNote,
                GeneratedDocType::ComplianceReport,
            ],
            Self::Syndication => &[
                GeneratedDocType::PrivatePlacementMemorandum,
                GeneratedDocType::SubscriptionAgreement,
                GeneratedDocType::ComplianceReport,
            ],
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Conventional => "conventional",
            Self::Bridge => "bridge",
            Self::Sba7a => "sba7a",
            Self::Syndication => "syndication",
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// OperationClass
// ---------------------------------------------------------------------------

/// Inbound operation class. Each class has its own rate-limit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    Read,
    Write,
    Pipeline,
}

impl OperationClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AuditAction
// ---------------------------------------------------------------------------

/// Type of action recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    Deleted,
    StatusChanged,
    PipelineFailed,
    PipelineRestarted,
    IssueResolved,
    DocumentGenerated,
    DocumentRegenerated,
    RegenerationConflict,
    RegenerationRolledBack,
    Downloaded,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::StatusChanged => "status_changed",
            Self::PipelineFailed => "pipeline_failed",
            Self::PipelineRestarted => "pipeline_restarted",
            Self::IssueResolved => "issue_resolved",
            Self::DocumentGenerated => "document_generated",
            Self::DocumentRegenerated => "document_regenerated",
            Self::RegenerationConflict => "regeneration_conflict",
            Self::RegenerationRolledBack => "regeneration_rolled_back",
            Self::Downloaded => "downloaded",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EntityType
// ---------------------------------------------------------------------------

/// Type of entity in the system, used in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Deal,
    SourceDocument,
    VerificationIssue,
    GeneratedDocument,
}

impl EntityType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deal => "deal",
            Self::SourceDocument => "source_document",
            Self::VerificationIssue => "verification_issue",
            Self::GeneratedDocument => "generated_document",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
