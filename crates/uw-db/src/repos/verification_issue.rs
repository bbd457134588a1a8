//! Verification issue repository.
//!
//! Issues are keyed naturally by `(deal_id, check_type, field_path)`, so
//! re-running verification never duplicates an issue. A `confirmed` or
//! `noted` resolution sticks. A `corrected` issue that the engine flags again
//! goes back to `pending` with the new figures: the correction did not make
//! the check pass.

use chrono::Utc;

use uw_core::entities::{NewVerificationIssue, VerificationIssue};
use uw_core::enums::ResolutionStatus;
use uw_core::identity::Caller;
use uw_core::ids::PREFIX_VERIFICATION_ISSUE;

use crate::error::DatabaseError;
use crate::helpers::{finish_tx, get_opt_string, parse_datetime, parse_enum, parse_optional_datetime};
use crate::service::UwService;

const SELECT_COLS: &str = "id, deal_id, check_type, field_path, expected, actual, severity, status, \
     detail, corrected_value, resolution_note, resolved_by, created_at, resolved_at";

fn row_to_issue(row: &libsql::Row) -> Result<VerificationIssue, DatabaseError> {
    Ok(VerificationIssue {
        id: row.get(0)?,
        deal_id: row.get(1)?,
        check_type: parse_enum(&row.get::<String>(2)?)?,
        field_path: row.get(3)?,
        expected: row.get(4)?,
        actual: row.get(5)?,
        severity: parse_enum(&row.get::<String>(6)?)?,
        status: parse_enum(&row.get::<String>(7)?)?,
        detail: row.get(8)?,
        corrected_value: get_opt_string(row, 9)?,
        resolution_note: get_opt_string(row, 10)?,
        resolved_by: get_opt_string(row, 11)?,
        created_at: parse_datetime(&row.get::<String>(12)?)?,
        resolved_at: parse_optional_datetime(get_opt_string(row, 13)?.as_deref())?,
    })
}

/// A human resolution of one pending issue.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub status: ResolutionStatus,
    /// Required when `status` is `Corrected`.
    pub corrected_value: Option<String>,
    pub note: Option<String>,
}

impl UwService {
    /// Insert the engine's issues in order, reopening corrected ones that
    /// failed again. Returns how many were new or reopened.
    pub async fn insert_verification_issues(
        &self,
        caller: &Caller,
        deal_id: &str,
        issues: &[NewVerificationIssue],
    ) -> Result<u64, DatabaseError> {
        if issues.is_empty() {
            return Ok(0);
        }

        let mut ids = Vec::with_capacity(issues.len());
        for _ in issues {
            ids.push(self.db().generate_id(PREFIX_VERIFICATION_ISSUE).await?);
        }
        let now = Utc::now().to_rfc3339();

        let conn = self.db().conn().await;
        let tx = conn.transaction().await?;
        let result = async {
            let mut inserted = 0u64;
            for (seq, (issue, id)) in issues.iter().zip(&ids).enumerate() {
                inserted += tx
                    .execute(
                        "INSERT INTO verification_issues
                         (id, deal_id, tenant_id, check_type, field_path, expected, actual, severity, status, detail, seq, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                         ON CONFLICT(deal_id, check_type, field_path) DO UPDATE SET
                           expected = excluded.expected, actual = excluded.actual,
                           severity = excluded.severity, detail = excluded.detail,
                           status = excluded.status, corrected_value = NULL,
                           resolution_note = NULL, resolved_by = NULL, resolved_at = NULL
                         WHERE verification_issues.status = ?13",
                        libsql::params![
                            id.as_str(),
                            deal_id,
                            caller.tenant_id.as_str(),
                            issue.check_type.as_str(),
                            issue.field_path.as_str(),
                            issue.expected.as_str(),
                            issue.actual.as_str(),
                            issue.severity.as_str(),
                            ResolutionStatus::Pending.as_str(),
                            issue.detail.as_str(),
                            i64::try_from(seq).unwrap_or(i64::MAX),
                            now.as_str(),
                            ResolutionStatus::Corrected.as_str()
                        ],
                    )
                    .await?;
            }
            Ok::<_, DatabaseError>(inserted)
        }
        .await;

        finish_tx(tx, result).await
    }

    pub async fn get_verification_issue(
        &self,
        caller: &Caller,
        id: &str,
    ) -> Result<VerificationIssue, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .await
            .query(
                &format!(
                    "SELECT {SELECT_COLS} FROM verification_issues WHERE id = ?1 AND tenant_id = ?2"
                ),
                libsql::params![id, caller.tenant_id.as_str()],
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        row_to_issue(&row)
    }

    /// Issues of a deal in the order the engine produced them.
    pub async fn list_verification_issues(
        &self,
        caller: &Caller,
        deal_id: &str,
        status: Option<ResolutionStatus>,
    ) -> Result<Vec<VerificationIssue>, DatabaseError> {
        let mut params: Vec<libsql::Value> =
            vec![deal_id.into(), caller.tenant_id.clone().into()];
        let mut sql =
            format!("SELECT {SELECT_COLS} FROM verification_issues WHERE deal_id = ?1 AND tenant_id = ?2");
        if let Some(status) = status {
            params.push(status.as_str().into());
            sql.push_str(" AND status = ?3");
        }
        sql.push_str(" ORDER BY created_at, seq, rowid");

        let mut rows = self
            .db()
            .conn()
            .await
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut issues = Vec::new();
        while let Some(row) = rows.next().await? {
            issues.push(row_to_issue(&row)?);
        }
        Ok(issues)
    }

    /// Resolve a pending issue. Only `pending → {confirmed, corrected, noted}`
    /// is allowed, and only once.
    pub async fn resolve_verification_issue(
        &self,
        caller: &Caller,
        id: &str,
        resolution: &Resolution,
    ) -> Result<VerificationIssue, DatabaseError> {
        if !ResolutionStatus::Pending.can_transition_to(resolution.status) {
            return Err(DatabaseError::InvalidState(format!(
                "{} is not a resolution",
                resolution.status
            )));
        }
        let corrected = resolution
            .corrected_value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty());
        match (resolution.status, corrected) {
            (ResolutionStatus::Corrected, None) => {
                return Err(DatabaseError::InvalidState(
                    "a corrected resolution requires a corrected value".into(),
                ));
            }
            (ResolutionStatus::Confirmed | ResolutionStatus::Noted, Some(_)) => {
                return Err(DatabaseError::InvalidState(format!(
                    "a corrected value is only accepted with the corrected resolution, not {}",
                    resolution.status
                )));
            }
            _ => {}
        }

        let affected = self
            .db()
            .conn()
            .await
            .execute(
                "UPDATE verification_issues
                 SET status = ?1, corrected_value = ?2, resolution_note = ?3, resolved_by = ?4, resolved_at = ?5
                 WHERE id = ?6 AND tenant_id = ?7 AND status = ?8",
                libsql::params![
                    resolution.status.as_str(),
                    corrected,
                    resolution.note.as_deref(),
                    caller.actor_id.as_str(),
                    Utc::now().to_rfc3339(),
                    id,
                    caller.tenant_id.as_str(),
                    ResolutionStatus::Pending.as_str()
                ],
            )
            .await?;

        let issue = self.get_verification_issue(caller, id).await?;
        if affected == 0 {
            return Err(DatabaseError::InvalidState(format!(
                "Cannot transition verification issue {id} from {} to {}",
                issue.status, resolution.status
            )));
        }
        Ok(issue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{caller, other_tenant, seed_deal, test_service};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use uw_core::enums::{CheckType, Severity};

    fn new_issue(path: &str, severity: Severity) -> NewVerificationIssue {
        NewVerificationIssue {
            check_type: CheckType::Math,
            field_path: path.to_string(),
            expected: "100.00".into(),
            actual: "101.00".into(),
            severity,
            detail: "a + b".into(),
        }
    }

    #[tokio::test]
    async fn insert_is_idempotent_on_natural_key() {
        let svc = test_service().await;
        let deal = seed_deal(&svc).await;
        let issues = vec![
            new_issue("operating_statement.total", Severity::Fail),
            new_issue("balance_sheet.total_assets", Severity::Warn),
        ];

        let first = svc
            .insert_verification_issues(&caller(), &deal.id, &issues)
            .await
            .unwrap();
        let second = svc
            .insert_verification_issues(&caller(), &deal.id, &issues)
            .await
            .unwrap();
        assert_eq!((first, second), (2, 0));

        let listed = svc
            .list_verification_issues(&caller(), &deal.id, None)
            .await
            .unwrap();
        let paths: Vec<&str> = listed.iter().map(|i| i.field_path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["operating_statement.total", "balance_sheet.total_assets"]
        );
    }

    #[tokio::test]
    async fn reinsert_keeps_resolution() {
        let svc = test_service().await;
        let deal = seed_deal(&svc).await;
        let issues = vec![new_issue("x.total", Severity::Fail)];
        svc.insert_verification_issues(&caller(), &deal.id, &issues)
            .await
            .unwrap();
        let issue = &svc
            .list_verification_issues(&caller(), &deal.id, None)
            .await
            .unwrap()[0];
        svc.resolve_verification_issue(
            &caller(),
            &issue.id,
            &Resolution {
                status: ResolutionStatus::Confirmed,
                corrected_value: None,
                note: Some("statement is right".into()),
            },
        )
        .await
        .unwrap();

        svc.insert_verification_issues(&caller(), &deal.id, &issues)
            .await
            .unwrap();
        let pending = svc
            .list_verification_issues(&caller(), &deal.id, Some(ResolutionStatus::Pending))
            .await
            .unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn corrected_issue_flagged_again_reopens() {
        let svc = test_service().await;
        let deal = seed_deal(&svc).await;
        svc.insert_verification_issues(&caller(), &deal.id, &[new_issue("x.total", Severity::Fail)])
            .await
            .unwrap();
        let issue = svc
            .list_verification_issues(&caller(), &deal.id, None)
            .await
            .unwrap()
            .remove(0);
        svc.resolve_verification_issue(
            &caller(),
            &issue.id,
            &Resolution {
                status: ResolutionStatus::Corrected,
                corrected_value: Some("102.00".into()),
                note: None,
            },
        )
        .await
        .unwrap();

        let still_wrong = NewVerificationIssue {
            actual: "102.00".into(),
            ..new_issue("x.total", Severity::Fail)
        };
        let reopened = svc
            .insert_verification_issues(&caller(), &deal.id, &[still_wrong])
            .await
            .unwrap();
        assert_eq!(reopened, 1);

        let all = svc
            .list_verification_issues(&caller(), &deal.id, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, issue.id);
        assert_eq!(all[0].status, ResolutionStatus::Pending);
        assert_eq!(all[0].actual, "102.00");
        assert_eq!(all[0].corrected_value, None);
        assert_eq!(all[0].resolved_at, None);
    }

    #[tokio::test]
    async fn corrected_resolution_records_value_and_actor() {
        let svc = test_service().await;
        let deal = seed_deal(&svc).await;
        svc.insert_verification_issues(&caller(), &deal.id, &[new_issue("x.total", Severity::Fail)])
            .await
            .unwrap();
        let issue = svc
            .list_verification_issues(&caller(), &deal.id, None)
            .await
            .unwrap()
            .remove(0);

        let resolved = svc
            .resolve_verification_issue(
                &caller(),
                &issue.id,
                &Resolution {
                    status: ResolutionStatus::Corrected,
                    corrected_value: Some(" 100.00 ".into()),
                    note: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(resolved.status, ResolutionStatus::Corrected);
        assert_eq!(resolved.corrected_value.as_deref(), Some("100.00"));
        assert_eq!(resolved.resolved_by.as_deref(), Some("usr-analyst"));
        assert!(resolved.resolved_at.is_some());
    }

    #[rstest]
    #[case(ResolutionStatus::Corrected, None)]
    #[case(ResolutionStatus::Confirmed, Some("5"))]
    #[case(ResolutionStatus::Pending, None)]
    #[tokio::test]
    async fn malformed_resolutions_rejected(
        #[case] status: ResolutionStatus,
        #[case] value: Option<&str>,
    ) {
        let svc = test_service().await;
        let deal = seed_deal(&svc).await;
        svc.insert_verification_issues(&caller(), &deal.id, &[new_issue("x.total", Severity::Fail)])
            .await
            .unwrap();
        let issue = svc
            .list_verification_issues(&caller(), &deal.id, None)
            .await
            .unwrap()
            .remove(0);

        let result = svc
            .resolve_verification_issue(
                &caller(),
                &issue.id,
                &Resolution {
                    status,
                    corrected_value: value.map(String::from),
                    note: None,
                },
            )
            .await;
        assert!(matches!(result, Err(DatabaseError::InvalidState(_))));
    }

    #[tokio::test]
    async fn resolve_twice_rejected() {
        let svc = test_service().await;
        let deal = seed_deal(&svc).await;
        svc.insert_verification_issues(&caller(), &deal.id, &[new_issue("x.total", Severity::Warn)])
            .await
            .unwrap();
        let issue = svc
            .list_verification_issues(&caller(), &deal.id, None)
            .await
            .unwrap()
            .remove(0);
        let noted = Resolution {
            status: ResolutionStatus::Noted,
            corrected_value: None,
            note: None,
        };
        svc.resolve_verification_issue(&caller(), &issue.id, &noted)
            .await
            .unwrap();
        let again = svc
            .resolve_verification_issue(&caller(), &issue.id, &noted)
            .await;
        assert!(matches!(again, Err(DatabaseError::InvalidState(_))));
    }

    #[tokio::test]
    async fn other_tenant_cannot_resolve() {
        let svc = test_service().await;
        let deal = seed_deal(&svc).await;
        svc.insert_verification_issues(&caller(), &deal.id, &[new_issue("x.total", Severity::Fail)])
            .await
            .unwrap();
        let issue = svc
            .list_verification_issues(&caller(), &deal.id, None)
            .await
            .unwrap()
            .remove(0);
        let result = svc
            .resolve_verification_issue(
                &other_tenant(),
                &issue.id,
                &Resolution {
                    status: ResolutionStatus::Confirmed,
                    corrected_value: None,
                    note: None,
                },
            )
            .await;
        assert!(matches!(result, Err(DatabaseError::NoResult)));
    }
}
