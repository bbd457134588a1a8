//! Service layer over `UwDb`.
//!
//! `UwService` is the persistent-store collaborator used by the pipeline.
//! All repo methods are implemented as `impl UwService` blocks in `repos/`
//! and take the caller's tenant so no query can cross tenants.

use crate::UwDb;
use crate::error::DatabaseError;

pub struct UwService {
    db: UwDb,
}

impl UwService {
    /// Create a new service wrapping a local database.
    ///
    /// `db_path` may be `":memory:"` for tests.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn new_local(db_path: &str) -> Result<Self, DatabaseError> {
        let db = UwDb::open_local(db_path).await?;
        Ok(Self { db })
    }

    /// Create from an existing `UwDb`.
    #[must_use]
    pub const fn from_db(db: UwDb) -> Self {
        Self { db }
    }

    /// Access the underlying database handle.
    #[must_use]
    pub const fn db(&self) -> &UwDb {
        &self.db
    }
}
