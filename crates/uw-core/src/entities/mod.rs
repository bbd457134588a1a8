//! Entity structs for all Underwrite domain objects.
//!
//! Each entity maps to a table in the libSQL database (see `uw-db`
//! migrations). All structs derive `Serialize`, `Deserialize`, and
//! `JsonSchema` for JSON roundtrip and schema validation.

mod audit;
mod compliance;
mod deal;
mod generated_document;
mod source_document;
mod verification_issue;

pub use audit::AuditEntry;
pub use compliance::{ComplianceIssue, RegulatoryCheck};
pub use deal::Deal;
pub use generated_document::{DocumentVersion, GeneratedDocument};
pub use source_document::SourceDocument;
pub use verification_issue::{NewVerificationIssue, VerificationIssue};
