//! Source document repository.
//!
//! Intake results are write-once: OCR text, classification and model
//! extraction are only recorded while the column is still empty, so a
//! re-run stage never overwrites what an earlier run stored.

use chrono::Utc;

use uw_core::entities::SourceDocument;
use uw_core::enums::SourceDocType;
use uw_core::identity::Caller;
use uw_core::ids::PREFIX_SOURCE_DOCUMENT;
use uw_core::keys::source_document_key;

use crate::error::DatabaseError;
use crate::helpers::{get_opt_string, parse_datetime, parse_optional_enum, parse_optional_json};
use crate::service::UwService;

const SELECT_COLS: &str = "id, deal_id, tenant_id, filename, storage_key, content_type, doc_type, \
     classification_confidence, ocr_text, ocr_extraction, model_extraction, reconciled, \
     created_at, updated_at";

fn row_to_source_document(row: &libsql::Row) -> Result<SourceDocument, DatabaseError> {
    Ok(SourceDocument {
        id: row.get(0)?,
        deal_id: row.get(1)?,
        tenant_id: row.get(2)?,
        filename: row.get(3)?,
        storage_key: row.get(4)?,
        content_type: row.get(5)?,
        doc_type: parse_optional_enum(get_opt_string(row, 6)?.as_deref())?,
        classification_confidence: row.get::<Option<f64>>(7)?,
        ocr_text: get_opt_string(row, 8)?,
        ocr_extraction: parse_optional_json(get_opt_string(row, 9)?.as_deref())?,
        model_extraction: parse_optional_json(get_opt_string(row, 10)?.as_deref())?,
        reconciled: parse_optional_json(get_opt_string(row, 11)?.as_deref())?,
        created_at: parse_datetime(&row.get::<String>(12)?)?,
        updated_at: parse_datetime(&row.get::<String>(13)?)?,
    })
}

impl UwService {
    /// Register an uploaded file. The storage key is derived from the new id;
    /// the caller uploads the bytes to it.
    pub async fn create_source_document(
        &self,
        caller: &Caller,
        deal_id: &str,
        filename: &str,
        content_type: &str,
    ) -> Result<SourceDocument, DatabaseError> {
        // Tenant check: the deal must belong to the caller.
        self.get_deal(caller, deal_id).await?;

        let now = Utc::now();
        let id = self.db().generate_id(PREFIX_SOURCE_DOCUMENT).await?;
        let storage_key = source_document_key(&caller.tenant_id, deal_id, &id);

        self.db()
            .conn()
            .await
            .execute(
                "INSERT INTO source_documents (id, deal_id, tenant_id, filename, storage_key, content_type, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                libsql::params![
                    id.as_str(),
                    deal_id,
                    caller.tenant_id.as_str(),
                    filename,
                    storage_key.as_str(),
                    content_type,
                    now.to_rfc3339(),
                    now.to_rfc3339()
                ],
            )
            .await?;

        Ok(SourceDocument {
            id,
            deal_id: deal_id.to_string(),
            tenant_id: caller.tenant_id.clone(),
            filename: filename.to_string(),
            storage_key,
            content_type: content_type.to_string(),
            doc_type: None,
            classification_confidence: None,
            ocr_text: None,
            ocr_extraction: None,
            model_extraction: None,
            reconciled: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get_source_document(
        &self,
        caller: &Caller,
        id: &str,
    ) -> Result<SourceDocument, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .await
            .query(
                &format!("SELECT {SELECT_COLS} FROM source_documents WHERE id = ?1 AND tenant_id = ?2"),
                libsql::params![id, caller.tenant_id.as_str()],
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        row_to_source_document(&row)
    }

    /// Source documents of a deal in upload order.
    pub async fn list_source_documents(
        &self,
        caller: &Caller,
        deal_id: &str,
    ) -> Result<Vec<SourceDocument>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .await
            .query(
                &format!(
                    "SELECT {SELECT_COLS} FROM source_documents WHERE deal_id = ?1 AND tenant_id = ?2 ORDER BY created_at, rowid"
                ),
                libsql::params![deal_id, caller.tenant_id.as_str()],
            )
            .await?;
        let mut docs = Vec::new();
        while let Some(row) = rows.next().await? {
            docs.push(row_to_source_document(&row)?);
        }
        Ok(docs)
    }

    /// Remove an upload whose bytes never reached storage, or one the user
    /// withdrew.
    pub async fn delete_source_document(
        &self,
        caller: &Caller,
        id: &str,
    ) -> Result<(), DatabaseError> {
        let affected = self
            .db()
            .conn()
            .await
            .execute(
                "DELETE FROM source_documents WHERE id = ?1 AND tenant_id = ?2",
                libsql::params![id, caller.tenant_id.as_str()],
            )
            .await?;
        if affected == 0 {
            return Err(DatabaseError::NoResult);
        }
        Ok(())
    }

    /// Store OCR output. No-op (returns `false`) if OCR was already recorded.
    pub async fn record_ocr(
        &self,
        caller: &Caller,
        id: &str,
        text: &str,
        extraction: &serde_json::Value,
    ) -> Result<bool, DatabaseError> {
        let affected = self
            .db()
            .conn()
            .await
            .execute(
                "UPDATE source_documents SET ocr_text = ?1, ocr_extraction = ?2, updated_at = ?3
                 WHERE id = ?4 AND tenant_id = ?5 AND ocr_text IS NULL",
                libsql::params![
                    text,
                    extraction.to_string(),
                    Utc::now().to_rfc3339(),
                    id,
                    caller.tenant_id.as_str()
                ],
            )
            .await?;
        Ok(affected > 0)
    }

    /// Store the classifier verdict. A classified document is immutable, so
    /// a second call is a no-op returning `false`.
    pub async fn record_classification(
        &self,
        caller: &Caller,
        id: &str,
        doc_type: SourceDocType,
        confidence: f64,
    ) -> Result<bool, DatabaseError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(DatabaseError::InvalidState(format!(
                "classification confidence must be within [0, 1], got {confidence}"
            )));
        }
        let affected = self
            .db()
            .conn()
            .await
            .execute(
                "UPDATE source_documents SET doc_type = ?1, classification_confidence = ?2, updated_at = ?3
                 WHERE id = ?4 AND tenant_id = ?5 AND doc_type IS NULL",
                libsql::params![
                    doc_type.as_str(),
                    confidence,
                    Utc::now().to_rfc3339(),
                    id,
                    caller.tenant_id.as_str()
                ],
            )
            .await?;
        Ok(affected > 0)
    }

    /// Store the model extraction. No-op (returns `false`) if already present.
    pub async fn record_model_extraction(
        &self,
        caller: &Caller,
        id: &str,
        extraction: &serde_json::Value,
    ) -> Result<bool, DatabaseError> {
        let affected = self
            .db()
            .conn()
            .await
            .execute(
                "UPDATE source_documents SET model_extraction = ?1, updated_at = ?2
                 WHERE id = ?3 AND tenant_id = ?4 AND model_extraction IS NULL",
                libsql::params![
                    extraction.to_string(),
                    Utc::now().to_rfc3339(),
                    id,
                    caller.tenant_id.as_str()
                ],
            )
            .await?;
        Ok(affected > 0)
    }

    /// Store the reconciler output. Reconciliation is deterministic, so a
    /// re-run overwrites with the same value.
    pub async fn record_reconciled(
        &self,
        caller: &Caller,
        id: &str,
        reconciled: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let affected = self
            .db()
            .conn()
            .await
            .execute(
                "UPDATE source_documents SET reconciled = ?1, updated_at = ?2 WHERE id = ?3 AND tenant_id = ?4",
                libsql::params![
                    reconciled.to_string(),
                    Utc::now().to_rfc3339(),
                    id,
                    caller.tenant_id.as_str()
                ],
            )
            .await?;
        if affected == 0 {
            return Err(DatabaseError::NoResult);
        }
        Ok(())
    }
}
