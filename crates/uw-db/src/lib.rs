//! # uw-db
//!
//! libSQL persistence for Underwrite.
//!
//! Holds deals, source documents, verification issues, generated documents
//! with their immutable version history, and the audit trail. Every query is
//! scoped by tenant. Status changes that must be single-flight (deal stage
//! transitions, document regeneration) are single-statement compare-and-swap
//! updates whose affected-row count decides the winner.

pub mod error;
pub mod helpers;
mod migrations;
pub mod repos;
pub mod service;
pub mod updates;

#[cfg(test)]
mod test_support;

use error::DatabaseError;
use libsql::Builder;
use tokio::sync::{Mutex, MutexGuard};

/// Central database handle.
///
/// Wraps a libSQL database and its single connection. The connection sits
/// behind a mutex: a statement holds the guard for its own duration, a
/// transaction holds it from `BEGIN` to commit or rollback, so no statement
/// from another task can land inside someone else's transaction.
pub struct UwDb {
    #[allow(dead_code)]
    db: libsql::Database,
    conn: Mutex<libsql::Connection>,
}

impl UwDb {
    /// Open a local database at the given path. `":memory:"` is accepted.
    ///
    /// Runs migrations automatically on open.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str) -> Result<Self, DatabaseError> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        // Must be set per connection in SQLite.
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Migration(format!("PRAGMA foreign_keys: {e}")))?;

        let uw_db = Self {
            db,
            conn: Mutex::new(conn),
        };
        uw_db.run_migrations().await?;
        Ok(uw_db)
    }

    /// Lock the underlying libSQL connection for direct queries.
    ///
    /// Keep the guard only as long as the statement or transaction needs it;
    /// calling `conn()` again while holding it deadlocks.
    pub async fn conn(&self) -> MutexGuard<'_, libsql::Connection> {
        self.conn.lock().await
    }

    /// Generate a prefixed ID via libSQL. Returns e.g. `"del-a3f8b2c1"`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or returns no rows.
    pub async fn generate_id(&self, prefix: &str) -> Result<String, DatabaseError> {
        let mut rows = self
            .conn()
            .await
            .query(
                &format!("SELECT '{prefix}-' || lower(hex(randomblob(4)))"),
                (),
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        Ok(row.get::<String>(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    async fn test_db() -> UwDb {
        UwDb::open_local(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn open_local_creates_schema() {
        let db = test_db().await;

        let tables = [
            "deals",
            "source_documents",
            "verification_issues",
            "generated_documents",
            "document_versions",
            "audit_trail",
        ];
        for table in &tables {
            let mut rows = db
                .conn()
                .await
                .query(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                    [*table],
                )
                .await
                .unwrap();
            let row = rows.next().await.unwrap();
            assert!(row.is_some(), "table '{table}' should exist");
        }
    }

    #[tokio::test]
    async fn generate_id_correct_format() {
        let db = test_db().await;
        let id = db.generate_id("del").await.unwrap();
        assert!(id.starts_with("del-"), "ID should start with 'del-': {id}");
        assert_eq!(id.len(), 12);
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn generate_id_all_prefixes() {
        let db = test_db().await;
        for prefix in uw_core::ids::ALL_PREFIXES {
            let id = db.generate_id(prefix).await.unwrap();
            assert!(id.starts_with(&format!("{prefix}-")));
        }
    }

    #[tokio::test]
    async fn generate_id_uniqueness() {
        let db = test_db().await;
        let mut ids = HashSet::new();
        for _ in 0..100 {
            let id = db.generate_id("tst").await.unwrap();
            assert!(ids.insert(id.clone()), "Duplicate ID generated: {id}");
        }
    }

    #[tokio::test]
    async fn idempotent_migrations() {
        let db = test_db().await;
        db.run_migrations().await.unwrap();
    }

    #[tokio::test]
    async fn file_backed_database_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uw.db");
        let path = path.to_str().unwrap();

        {
            let db = UwDb::open_local(path).await.unwrap();
            db.conn()
                .await
                .execute(
                    "INSERT INTO deals (id, tenant_id, name, program, jurisdiction) VALUES ('del-1', 't', 'n', 'bridge', 'NY')",
                    (),
                )
                .await
                .unwrap();
        }

        let db = UwDb::open_local(path).await.unwrap();
        let mut rows = db
            .conn()
            .await
            .query("SELECT status FROM deals WHERE id = 'del-1'", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<String>(0).unwrap(), "uploaded");
    }

    #[tokio::test]
    async fn document_versions_reject_updates() {
        let db = test_db().await;
        db.conn()
            .await
            .execute_batch(
                "INSERT INTO deals (id, tenant_id, name, program, jurisdiction) VALUES ('del-1', 't', 'n', 'bridge', 'NY');
                 INSERT INTO generated_documents (id, deal_id, tenant_id, doc_type, storage_key, status, compliance_status, verification_status)
                   VALUES ('gdc-1', 'del-1', 't', 'term_sheet', 'k1', 'generated', 'passed', 'passed');
                 INSERT INTO document_versions (document_id, version, storage_key, compliance_status, verification_status)
                   VALUES ('gdc-1', 1, 'k1', 'passed', 'passed');",
            )
            .await
            .unwrap();

        let result = db
            .conn()
            .await
            .execute(
                "UPDATE document_versions SET storage_key = 'k2' WHERE document_id = 'gdc-1'",
                (),
            )
            .await;
        assert!(result.is_err(), "version rows must be immutable");
    }
}
