//! # uw-pipeline
//!
//! The deal pipeline for Underwrite.
//!
//! [`Pipeline`] owns every operator-facing operation: deals, uploads, runs,
//! issue resolution, regeneration and downloads. Each one is admitted by the
//! [`RateLimiter`] first and audited through the [`AuditSink`] after. The
//! per-document generate/review loop lives in [`Generator`], which pairs a
//! drafting model call with deterministic [`regulatory`] checks and a model
//! [`compliance`] review.

pub mod audit;
pub mod compliance;
pub mod error;
pub mod generator;
pub mod intake;
mod json;
pub mod limiter;
pub mod machine;
pub mod regulatory;

pub use audit::{AuditRecord, AuditSink, AuditWriter};
pub use compliance::ComplianceReviewer;
pub use error::PipelineError;
pub use generator::{Feedback, GenerationContext, Generated, Generator};
pub use intake::{Classification, IntakeError, IntakeService, ModelIntake, OcrOutput};
pub use limiter::{Clock, ManualClock, RateLimiter, Rejection, SystemClock};
pub use machine::{Download, DownloadBody, Pipeline};
