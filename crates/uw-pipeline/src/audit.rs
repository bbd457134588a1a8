//! Fire-and-forget audit recording.
//!
//! Each record is written on a detached task. A failed write is logged with
//! `tracing::warn!` and dropped; it never reaches the operation that
//! produced it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use uw_core::entities::AuditEntry;
use uw_core::enums::{AuditAction, EntityType};
use uw_core::identity::Caller;
use uw_core::ids::PREFIX_AUDIT;
use uw_db::error::DatabaseError;
use uw_db::service::UwService;

/// An audit event before it is given an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub tenant_id: String,
    pub actor_id: String,
    pub action: AuditAction,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<String>,
    pub detail: Option<serde_json::Value>,
    /// When the action happened, not when the write landed.
    pub created_at: DateTime<Utc>,
}

/// Where audit records end up.
#[async_trait]
pub trait AuditWriter: Send + Sync {
    async fn write(&self, record: AuditRecord) -> Result<(), DatabaseError>;
}

#[async_trait]
impl AuditWriter for UwService {
    async fn write(&self, record: AuditRecord) -> Result<(), DatabaseError> {
        let entry = AuditEntry {
            id: self.db().generate_id(PREFIX_AUDIT).await?,
            tenant_id: record.tenant_id,
            actor_id: record.actor_id,
            entity_type: record.entity_type,
            entity_id: record.entity_id,
            action: record.action,
            detail: record.detail,
            created_at: record.created_at,
        };
        self.append_audit(&entry).await
    }
}

#[derive(Clone)]
pub struct AuditSink {
    writer: Arc<dyn AuditWriter>,
    in_flight: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl std::fmt::Debug for AuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditSink")
            .field("in_flight", &self.in_flight.lock().len())
            .finish_non_exhaustive()
    }
}

impl AuditSink {
    #[must_use]
    pub fn new(writer: Arc<dyn AuditWriter>) -> Self {
        Self {
            writer,
            in_flight: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Record `action` by `caller` on a detached task.
    ///
    /// `detail` is serialized up front; a detail that cannot be serialized is
    /// recorded without it.
    pub fn record<D: Serialize>(
        &self,
        caller: &Caller,
        action: AuditAction,
        target: Option<(EntityType, &str)>,
        detail: Option<&D>,
    ) {
        let detail = detail.and_then(|d| match serde_json::to_value(d) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(%action, error = %e, "audit detail not serializable");
                None
            }
        });
        let record = AuditRecord {
            tenant_id: caller.tenant_id.clone(),
            actor_id: caller.actor_id.clone(),
            action,
            entity_type: target.map(|(t, _)| t),
            entity_id: target.map(|(_, id)| id.to_string()),
            detail,
            created_at: Utc::now(),
        };

        let writer = Arc::clone(&self.writer);
        let handle = tokio::spawn(async move {
            let action = record.action;
            if let Err(e) = writer.write(record).await {
                tracing::warn!(%action, error = %e, "audit write failed");
            }
        });

        let mut in_flight = self.in_flight.lock();
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
    }

    /// Record an action that carries no detail.
    pub fn record_bare(&self, caller: &Caller, action: AuditAction, target: Option<(EntityType, &str)>) {
        self.record::<()>(caller, action, target, None);
    }

    /// Wait for every record issued so far. Called before process exit so
    /// detached writes are not cut off.
    pub async fn drain(&self) {
        let handles: Vec<_> = std::mem::take(&mut *self.in_flight.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "audit task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uw_core::audit_detail::PipelineFailedDetail;
    use uw_db::repos::audit::AuditFilter;

    struct Failing(AtomicU32);

    #[async_trait]
    impl AuditWriter for Failing {
        async fn write(&self, _record: AuditRecord) -> Result<(), DatabaseError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(DatabaseError::Query("disk full".into()))
        }
    }

    fn caller() -> Caller {
        Caller::new("ten-acme", "usr-analyst")
    }

    #[tokio::test]
    async fn records_reach_the_store() {
        let svc = Arc::new(UwService::new_local(":memory:").await.unwrap());
        let sink = AuditSink::new(svc.clone());
        let detail = PipelineFailedDetail {
            step: "extracting".into(),
            message: "provider unavailable".into(),
        };
        sink.record(
            &caller(),
            AuditAction::PipelineFailed,
            Some((EntityType::Deal, "del-1")),
            Some(&detail),
        );
        sink.drain().await;

        let entries = svc.query_audit(&caller(), &AuditFilter::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::PipelineFailed);
        assert_eq!(entries[0].entity_id.as_deref(), Some("del-1"));
        assert_eq!(entries[0].detail.as_ref().unwrap()["step"], "extracting");
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let writer = Arc::new(Failing(AtomicU32::new(0)));
        let sink = AuditSink::new(writer.clone());
        for _ in 0..3 {
            sink.record_bare(&caller(), AuditAction::Downloaded, None);
        }
        sink.drain().await;
        assert_eq!(writer.0.load(Ordering::SeqCst), 3);
    }
}
