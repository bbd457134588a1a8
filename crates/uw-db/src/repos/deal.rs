//! Deal repository: create, tenant-scoped reads, gated edits, soft delete and
//! compare-and-swap status changes.

use chrono::Utc;

use uw_core::entities::Deal;
use uw_core::enums::{DealStatus, Program};
use uw_core::identity::Caller;
use uw_core::ids::PREFIX_DEAL;

use crate::error::{Conflict, DatabaseError};
use crate::helpers::{
    get_opt_string, parse_datetime, parse_enum, parse_optional_datetime, parse_optional_enum,
    parse_optional_json,
};
use crate::service::UwService;
use crate::updates::deal::DealUpdate;

const SELECT_COLS: &str = "id, tenant_id, name, program, jurisdiction, status, error_step, \
     error_message, verified_data, terms, created_at, updated_at, deleted_at";

fn row_to_deal(row: &libsql::Row) -> Result<Deal, DatabaseError> {
    Ok(Deal {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        program: parse_enum(&row.get::<String>(3)?)?,
        jurisdiction: row.get(4)?,
        status: parse_enum(&row.get::<String>(5)?)?,
        error_step: parse_optional_enum(get_opt_string(row, 6)?.as_deref())?,
        error_message: get_opt_string(row, 7)?,
        verified_data: parse_optional_json(get_opt_string(row, 8)?.as_deref())?,
        terms: parse_optional_json(get_opt_string(row, 9)?.as_deref())?,
        created_at: parse_datetime(&row.get::<String>(10)?)?,
        updated_at: parse_datetime(&row.get::<String>(11)?)?,
        deleted_at: parse_optional_datetime(get_opt_string(row, 12)?.as_deref())?,
    })
}

fn json_param(value: Option<&serde_json::Value>) -> libsql::Value {
    value.map_or(libsql::Value::Null, |v| libsql::Value::Text(v.to_string()))
}

impl UwService {
    pub async fn create_deal(
        &self,
        caller: &Caller,
        name: &str,
        program: Program,
        jurisdiction: &str,
    ) -> Result<Deal, DatabaseError> {
        if name.trim().is_empty() {
            return Err(DatabaseError::InvalidState("deal name is required".into()));
        }
        let jurisdiction = jurisdiction.trim().to_ascii_uppercase();
        if jurisdiction.len() != 2 || !jurisdiction.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DatabaseError::InvalidState(format!(
                "jurisdiction must be a two-letter code, got '{jurisdiction}'"
            )));
        }

        let now = Utc::now();
        let id = self.db().generate_id(PREFIX_DEAL).await?;

        self.db()
            .conn()
            .await
            .execute(
                "INSERT INTO deals (id, tenant_id, name, program, jurisdiction, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                libsql::params![
                    id.as_str(),
                    caller.tenant_id.as_str(),
                    name,
                    program.as_str(),
                    jurisdiction.as_str(),
                    DealStatus::Uploaded.as_str(),
                    now.to_rfc3339(),
                    now.to_rfc3339()
                ],
            )
            .await?;

        Ok(Deal {
            id,
            tenant_id: caller.tenant_id.clone(),
            name: name.to_string(),
            program,
            jurisdiction,
            status: DealStatus::Uploaded,
            error_step: None,
            error_message: None,
            verified_data: None,
            terms: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Fetch a live (not soft-deleted) deal owned by the caller's tenant.
    pub async fn get_deal(&self, caller: &Caller, id: &str) -> Result<Deal, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .await
            .query(
                &format!(
                    "SELECT {SELECT_COLS} FROM deals WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL"
                ),
                libsql::params![id, caller.tenant_id.as_str()],
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        row_to_deal(&row)
    }

    pub async fn list_deals(
        &self,
        caller: &Caller,
        status: Option<DealStatus>,
        limit: u32,
    ) -> Result<Vec<Deal>, DatabaseError> {
        let mut params: Vec<libsql::Value> = vec![caller.tenant_id.clone().into()];
        let mut sql = format!(
            "SELECT {SELECT_COLS} FROM deals WHERE tenant_id = ?1 AND deleted_at IS NULL"
        );
        if let Some(status) = status {
            params.push(status.as_str().into());
            sql.push_str(" AND status = ?2");
        }
        sql.push_str(&format!(" ORDER BY created_at DESC LIMIT {limit}"));

        let mut rows = self
            .db()
            .conn()
            .await
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut deals = Vec::new();
        while let Some(row) = rows.next().await? {
            deals.push(row_to_deal(&row)?);
        }
        Ok(deals)
    }

    /// Apply an update regardless of status. Used by the pipeline to store
    /// verified data and terms.
    pub async fn update_deal(
        &self,
        caller: &Caller,
        id: &str,
        update: &DealUpdate,
    ) -> Result<Deal, DatabaseError> {
        let affected = self.apply_deal_update(caller, id, update, false).await?;
        if affected == 0 {
            return Err(DatabaseError::NoResult);
        }
        self.get_deal(caller, id).await
    }

    /// User edit path. Only name/program/jurisdiction may change, and only
    /// while the deal is `uploaded` or `needs_review`.
    pub async fn edit_deal(
        &self,
        caller: &Caller,
        id: &str,
        update: &DealUpdate,
    ) -> Result<Deal, DatabaseError> {
        if !update.is_user_editable() {
            return Err(DatabaseError::InvalidState(
                "verified data and terms are written by the pipeline only".into(),
            ));
        }
        let affected = self.apply_deal_update(caller, id, update, true).await?;
        if affected == 0 {
            let current = self.get_deal(caller, id).await?;
            return Err(DatabaseError::InvalidState(format!(
                "deal {id} is {}; only uploaded or needs_review deals are editable",
                current.status
            )));
        }
        self.get_deal(caller, id).await
    }

    async fn apply_deal_update(
        &self,
        caller: &Caller,
        id: &str,
        update: &DealUpdate,
        editable_only: bool,
    ) -> Result<u64, DatabaseError> {
        let mut sets = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(ref name) = update.name {
            params.push(name.clone().into());
            sets.push(format!("name = ?{}", params.len()));
        }
        if let Some(program) = update.program {
            params.push(program.as_str().into());
            sets.push(format!("program = ?{}", params.len()));
        }
        if let Some(ref jurisdiction) = update.jurisdiction {
            params.push(jurisdiction.trim().to_ascii_uppercase().into());
            sets.push(format!("jurisdiction = ?{}", params.len()));
        }
        if let Some(ref data) = update.verified_data {
            params.push(json_param(data.as_ref()));
            sets.push(format!("verified_data = ?{}", params.len()));
        }
        if let Some(ref terms) = update.terms {
            params.push(json_param(terms.as_ref()));
            sets.push(format!("terms = ?{}", params.len()));
        }

        params.push(Utc::now().to_rfc3339().into());
        sets.push(format!("updated_at = ?{}", params.len()));

        params.push(id.into());
        let id_idx = params.len();
        params.push(caller.tenant_id.clone().into());
        let tenant_idx = params.len();

        let gate = if editable_only {
            format!(
                " AND status IN ('{}', '{}')",
                DealStatus::Uploaded.as_str(),
                DealStatus::NeedsReview.as_str()
            )
        } else {
            String::new()
        };

        let sql = format!(
            "UPDATE deals SET {} WHERE id = ?{id_idx} AND tenant_id = ?{tenant_idx} AND deleted_at IS NULL{gate}",
            sets.join(", ")
        );
        Ok(self
            .db()
            .conn()
            .await
            .execute(&sql, libsql::params_from_iter(params))
            .await?)
    }

    /// Set the tombstone. Deals are never hard-deleted.
    pub async fn soft_delete_deal(&self, caller: &Caller, id: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let affected = self
            .db()
            .conn()
            .await
            .execute(
                "UPDATE deals SET deleted_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND tenant_id = ?3 AND deleted_at IS NULL",
                libsql::params![now.as_str(), id, caller.tenant_id.as_str()],
            )
            .await?;
        if affected == 0 {
            return Err(DatabaseError::NoResult);
        }
        Ok(())
    }

    /// Atomically move a deal from `expected` to `next`.
    ///
    /// Returns the affected row count: `1` if this caller won, `0` if the deal
    /// was no longer in `expected` (or does not exist). Clears any recorded
    /// error. The transition must be listed in the status table.
    pub async fn compare_and_swap_deal_status(
        &self,
        caller: &Caller,
        id: &str,
        expected: DealStatus,
        next: DealStatus,
    ) -> Result<u64, DatabaseError> {
        if !expected.can_transition_to(next) {
            return Err(DatabaseError::InvalidState(format!(
                "Cannot transition deal {id} from {expected} to {next}"
            )));
        }
        let affected = self
            .db()
            .conn()
            .await
            .execute(
                "UPDATE deals SET status = ?1, error_step = NULL, error_message = NULL, updated_at = ?2
                 WHERE id = ?3 AND tenant_id = ?4 AND status = ?5 AND deleted_at IS NULL",
                libsql::params![
                    next.as_str(),
                    Utc::now().to_rfc3339(),
                    id,
                    caller.tenant_id.as_str(),
                    expected.as_str()
                ],
            )
            .await?;
        Ok(affected)
    }

    /// CAS transition that reports a lost race as [`Conflict::StatusChanged`].
    pub async fn transition_deal(
        &self,
        caller: &Caller,
        id: &str,
        expected: DealStatus,
        next: DealStatus,
    ) -> Result<Deal, DatabaseError> {
        if self
            .compare_and_swap_deal_status(caller, id, expected, next)
            .await?
            == 0
        {
            let current = self.get_deal(caller, id).await?;
            return Err(Conflict::StatusChanged {
                expected: expected.as_str().to_string(),
                current: current.status.as_str().to_string(),
            }
            .into());
        }
        self.get_deal(caller, id).await
    }

    /// Move a deal to `error`, recording the step it failed in.
    ///
    /// Only succeeds if the deal is still in `failed_step`; returns the
    /// affected row count.
    pub async fn record_deal_error(
        &self,
        caller: &Caller,
        id: &str,
        failed_step: DealStatus,
        message: &str,
    ) -> Result<u64, DatabaseError> {
        if !failed_step.can_transition_to(DealStatus::Error) {
            return Err(DatabaseError::InvalidState(format!(
                "deal {id} cannot fail from {failed_step}"
            )));
        }
        let affected = self
            .db()
            .conn()
            .await
            .execute(
                "UPDATE deals SET status = ?1, error_step = ?2, error_message = ?3, updated_at = ?4
                 WHERE id = ?5 AND tenant_id = ?6 AND status = ?2 AND deleted_at IS NULL",
                libsql::params![
                    DealStatus::Error.as_str(),
                    failed_step.as_str(),
                    message,
                    Utc::now().to_rfc3339(),
                    id,
                    caller.tenant_id.as_str()
                ],
            )
            .await?;
        Ok(affected)
    }

    /// Leave `error` for the recorded failed step. Only the recorded step is
    /// accepted; returns the affected row count.
    pub async fn restart_deal(
        &self,
        caller: &Caller,
        id: &str,
        step: DealStatus,
    ) -> Result<u64, DatabaseError> {
        if !DealStatus::Error.can_transition_to(step) {
            return Err(DatabaseError::InvalidState(format!(
                "deal {id} cannot restart at {step}"
            )));
        }
        let affected = self
            .db()
            .conn()
            .await
            .execute(
                "UPDATE deals SET status = ?1, error_step = NULL, error_message = NULL, updated_at = ?2
                 WHERE id = ?3 AND tenant_id = ?4 AND status = ?5 AND error_step = ?1 AND deleted_at IS NULL",
                libsql::params![
                    step.as_str(),
                    Utc::now().to_rfc3339(),
                    id,
                    caller.tenant_id.as_str(),
                    DealStatus::Error.as_str()
                ],
            )
            .await?;
        Ok(affected)
    }
}
