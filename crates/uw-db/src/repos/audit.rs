//! Audit trail repository.
//!
//! Append-only entries written by the pipeline's audit sink. Queries are
//! always scoped to the caller's tenant.

use uw_core::entities::AuditEntry;
use uw_core::enums::{AuditAction, EntityType};
use uw_core::identity::Caller;

use crate::error::DatabaseError;
use crate::helpers::{
    get_opt_string, parse_datetime, parse_enum, parse_optional_enum, parse_optional_json,
};
use crate::service::UwService;

/// Filter criteria for audit queries.
#[derive(Debug, Default, Clone)]
pub struct AuditFilter {
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<String>,
    pub action: Option<AuditAction>,
    pub actor_id: Option<String>,
    pub limit: Option<u32>,
}

impl UwService {
    /// Append an audit entry.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the INSERT fails.
    pub async fn append_audit(&self, entry: &AuditEntry) -> Result<(), DatabaseError> {
        self.db()
            .conn()
            .await
            .execute(
                "INSERT INTO audit_trail (id, tenant_id, actor_id, entity_type, entity_id, action, detail, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                libsql::params![
                    entry.id.as_str(),
                    entry.tenant_id.as_str(),
                    entry.actor_id.as_str(),
                    entry.entity_type.map(EntityType::as_str),
                    entry.entity_id.as_deref(),
                    entry.action.as_str(),
                    entry.detail.as_ref().map(std::string::ToString::to_string).as_deref(),
                    entry.created_at.to_rfc3339()
                ],
            )
            .await?;
        Ok(())
    }

    /// Query the caller's tenant audit entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn query_audit(
        &self,
        caller: &Caller,
        filter: &AuditFilter,
    ) -> Result<Vec<AuditEntry>, DatabaseError> {
        let mut params: Vec<libsql::Value> =
            vec![libsql::Value::Text(caller.tenant_id.clone())];
        let mut conditions = vec!["tenant_id = ?1".to_string()];

        if let Some(et) = filter.entity_type {
            params.push(libsql::Value::Text(et.as_str().to_string()));
            conditions.push(format!("entity_type = ?{}", params.len()));
        }
        if let Some(ref eid) = filter.entity_id {
            params.push(libsql::Value::Text(eid.clone()));
            conditions.push(format!("entity_id = ?{}", params.len()));
        }
        if let Some(action) = filter.action {
            params.push(libsql::Value::Text(action.as_str().to_string()));
            conditions.push(format!("action = ?{}", params.len()));
        }
        if let Some(ref actor) = filter.actor_id {
            params.push(libsql::Value::Text(actor.clone()));
            conditions.push(format!("actor_id = ?{}", params.len()));
        }

        let limit = filter.limit.unwrap_or(100);
        let sql = format!(
            "SELECT id, tenant_id, actor_id, entity_type, entity_id, action, detail, created_at
             FROM audit_trail WHERE {}
             ORDER BY created_at DESC, rowid DESC LIMIT {limit}",
            conditions.join(" AND ")
        );

        let mut rows = self
            .db()
            .conn()
            .await
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(AuditEntry {
                id: row.get::<String>(0)?,
                tenant_id: row.get::<String>(1)?,
                actor_id: row.get::<String>(2)?,
                entity_type: parse_optional_enum(get_opt_string(&row, 3)?.as_deref())?,
                entity_id: get_opt_string(&row, 4)?,
                action: parse_enum(&row.get::<String>(5)?)?,
                detail: parse_optional_json(get_opt_string(&row, 6)?.as_deref())?,
                created_at: parse_datetime(&row.get::<String>(7)?)?,
            });
        }
        Ok(entries)
    }
}
