//! Append-only `AuditEvent` writer (spec §3.5), invoked by the repository
//! kernel on every mutation and by services for domain-level actions
//! (login, workflow execution) that are not themselves document writes.

use async_trait::async_trait;
use bson::doc;
use chrono::{DateTime, Utc};
use mongodb::Collection;
use modkit_errors::ApiError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditEventType {
    Create,
    Update,
    Delete,
    HardDelete,
    Login,
    WorkflowExecute,
    WorkflowCancel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub event_type: AuditEventType,
    pub actor_user_id: String,
    pub tenant_id: String,
    pub resource_type: String,
    pub resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    #[must_use]
    pub fn new(
        event_type: AuditEventType,
        actor_user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            actor_user_id: actor_user_id.into(),
            tenant_id: tenant_id.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            before: None,
            after: None,
            reason: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_before(mut self, before: Value) -> Self {
        self.before = Some(before);
        self
    }

    #[must_use]
    pub fn with_after(mut self, after: Value) -> Self {
        self.after = Some(after);
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Append-only sink for audit events. No update or delete is ever exposed
/// on this trait — that asymmetry is the point.
#[async_trait]
pub trait AuditTrail: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), ApiError>;

    /// Used by integration tests and the platform-admin audit viewer; not
    /// part of the spec's mutation path.
    async fn find_for_resource(
        &self,
        tenant_id: &str,
        resource_id: &str,
    ) -> Result<Vec<AuditEvent>, ApiError>;
}

/// Mongo-backed append-only collection writer, time-indexed per spec §6.2.
pub struct MongoAuditTrail {
    collection: Collection<AuditEvent>,
}

impl MongoAuditTrail {
    #[must_use]
    pub fn new(collection: Collection<AuditEvent>) -> Self {
        Self { collection }
    }
}

#[async_trait]
impl AuditTrail for MongoAuditTrail {
    async fn record(&self, event: AuditEvent) -> Result<(), ApiError> {
        tracing::debug!(
            event_type = ?event.event_type,
            resource_id = %event.resource_id,
            tenant_id = %event.tenant_id,
            "recording audit event"
        );
        self.collection
            .insert_one(event)
            .await
            .map_err(|e| ApiError::database(format!("failed to write audit event: {e}")))?;
        Ok(())
    }

    async fn find_for_resource(
        &self,
        tenant_id: &str,
        resource_id: &str,
    ) -> Result<Vec<AuditEvent>, ApiError> {
        use futures::stream::TryStreamExt;

        let filter = doc! { "tenantId": tenant_id, "resourceId": resource_id };
        let cursor = self
            .collection
            .find(filter)
            .await
            .map_err(|e| ApiError::database(format!("audit query failed: {e}")))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| ApiError::database(format!("audit query failed: {e}")))
    }
}

/// Wraps `Arc<dyn AuditTrail>` so it can be stored in a type-keyed service
/// registry (`modkit::ServiceRegistry::insert` requires its type parameter
/// to be `Sized`, which a bare trait object is not).
#[derive(Clone)]
pub struct AuditTrailHandle(pub std::sync::Arc<dyn AuditTrail>);

/// In-memory append-only sink, used by unit tests for services that take
/// `Arc<dyn AuditTrail>`.
#[derive(Default)]
pub struct InMemoryAuditTrail {
    events: parking_lot::Mutex<Vec<AuditEvent>>,
}

#[async_trait]
impl AuditTrail for InMemoryAuditTrail {
    async fn record(&self, event: AuditEvent) -> Result<(), ApiError> {
        self.events.lock().push(event);
        Ok(())
    }

    async fn find_for_resource(
        &self,
        tenant_id: &str,
        resource_id: &str,
    ) -> Result<Vec<AuditEvent>, ApiError> {
        Ok(self
            .events
            .lock()
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.resource_id == resource_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_trail_is_append_only_and_queryable() {
        let trail = InMemoryAuditTrail::default();
        trail
            .record(AuditEvent::new(
                AuditEventType::Create,
                "actor-1",
                "tenant-1",
                "asset",
                "doc-1",
            ))
            .await
            .expect("record create");
        trail
            .record(AuditEvent::new(
                AuditEventType::Delete,
                "actor-1",
                "tenant-1",
                "asset",
                "doc-1",
            ))
            .await
            .expect("record delete");

        let events = trail
            .find_for_resource("tenant-1", "doc-1")
            .await
            .expect("query events");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::Create);
        assert_eq!(events[1].event_type, AuditEventType::Delete);
        assert!(events.iter().all(|e| e.actor_user_id == "actor-1"));
    }
}
