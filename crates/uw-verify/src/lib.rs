//! # uw-verify
//!
//! Extraction reconciliation and deterministic verification for Underwrite.
//!
//! Every source document is extracted twice (OCR and a model pass). The
//! [`Reconciler`] merges the two into a [`ReconciledRecord`] with per-field
//! provenance; records are folded into a [`VerifiedDataset`]; the
//! [`VerificationEngine`] then recomputes declared totals and cross-checks
//! documents against each other. Nothing in this crate calls a model.

pub mod dataset;
pub mod engine;
pub mod reconcile;
pub mod rules;
pub mod value;

pub use dataset::VerifiedDataset;
pub use engine::{
    CheckOutcome, CheckStatus, VerificationEngine, VerificationReport, blocking_issues,
    can_leave_verification, math_check,
};
pub use reconcile::{ReconciledField, ReconciledRecord, Reconciler};
pub use rules::RuleSet;
