//! Repository modules implementing persistence for all Underwrite entities.
//!
//! Each module adds methods to `UwService` via `impl UwService` blocks.

pub mod audit;
pub mod deal;
pub mod generated_document;
pub mod source_document;
pub mod verification_issue;
