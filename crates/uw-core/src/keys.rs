//! Object storage key layout.
//!
//! Every key is prefixed by tenant so a bucket listing can never mix tenants.

use crate::enums::GeneratedDocType;

/// Key for an uploaded source document.
#[must_use]
pub fn source_document_key(tenant_id: &str, deal_id: &str, source_id: &str) -> String {
    format!("tenants/{tenant_id}/deals/{deal_id}/sources/{source_id}")
}

/// Key for one version of a generated document. Each version gets its own
/// object; older versions stay downloadable.
#[must_use]
pub fn generated_document_key(
    tenant_id: &str,
    deal_id: &str,
    doc_type: GeneratedDocType,
    version: i64,
) -> String {
    format!(
        "tenants/{tenant_id}/deals/{deal_id}/documents/{}/v{version}.md",
        doc_type.as_str()
    )
}
