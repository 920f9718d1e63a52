use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use streamfold_core::ValueObject;
use streamfold_entity::{
    EntityCreated, EntityDeleted, EntityDescriptionUpdated, EntityEvent, EntityEventDecodeError, EntityId,
    EntityUpdated,
};
use streamfold_events::{Event, EventEnvelope, Projection, ProjectionError, group_by_stream};

use crate::read_model::{DocumentStore, StoreError};

pub const AUDIT_LOG_PROJECTION: &str = "entity.audit_log";

/// One human-readable line of an entity's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub description: String,
    pub payload: JsonValue,
}

impl ValueObject for AuditLogEntry {}

impl AuditLogEntry {
    pub fn for_event(event: &EntityEvent) -> Result<Self, EntityEventDecodeError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            occurred_at: event.occurred_at(),
            description: describe(event),
            payload: event.to_payload()?,
        })
    }
}

fn stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn describe(event: &EntityEvent) -> String {
    match event {
        EntityEvent::Created(EntityCreated {
            id,
            user_id,
            occurred_at,
            ..
        }) => format!("entity {id} created by user {user_id} at {}", stamp(*occurred_at)),
        EntityEvent::Updated(EntityUpdated {
            id,
            user_id,
            occurred_at,
            ..
        }) => format!("entity {id} updated by user {user_id} at {}", stamp(*occurred_at)),
        EntityEvent::DescriptionUpdated(EntityDescriptionUpdated {
            id,
            description,
            user_id,
            occurred_at,
        }) => format!(
            "description of entity {id} set to `{description}` by user {user_id} at {}",
            stamp(*occurred_at)
        ),
        EntityEvent::Deleted(EntityDeleted {
            id,
            user_id,
            occurred_at,
        }) => format!("entity {id} deleted by user {user_id} at {}", stamp(*occurred_at)),
    }
}

/// Per-entity audit trail.
///
/// `entries` behaves as a set: an entry equal to one already present is not
/// added again, so re-delivered events leave the log unchanged. A deleted
/// entity keeps its log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: EntityId,
    pub entries: Vec<AuditLogEntry>,
}

impl AuditLog {
    /// Start a log from the stream's creation event.
    pub fn initialize(created: &EntityCreated) -> Result<Self, EntityEventDecodeError> {
        let entry = AuditLogEntry::for_event(&EntityEvent::Created(created.clone()))?;
        Ok(Self {
            id: created.id,
            entries: vec![entry],
        })
    }

    /// Produce the next log with the event's entry added (set union).
    pub fn apply(&self, event: &EntityEvent) -> Result<Self, EntityEventDecodeError> {
        let entry = AuditLogEntry::for_event(event)?;
        let mut next = self.clone();
        if !next.entries.contains(&entry) {
            next.entries.push(entry);
        }
        Ok(next)
    }
}

/// Audit trail projection: one [`AuditLog`] document per entity stream.
///
/// Streams in a batch are folded independently; each stream's document is
/// loaded once, advanced through that stream's events in version order and
/// written back once.
#[derive(Debug)]
pub struct AuditLogProjection<S> {
    store: S,
}

impl<S> AuditLogProjection<S>
where
    S: DocumentStore<EntityId, AuditLog>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: EntityId) -> Result<Option<AuditLog>, StoreError> {
        self.store.get(&id).await
    }

    pub async fn list(&self) -> Result<Vec<AuditLog>, StoreError> {
        self.store.list().await
    }

    fn step(
        current: Option<AuditLog>,
        env: &EventEnvelope<EntityEvent>,
    ) -> Result<AuditLog, ProjectionError> {
        let encode_failed = |e: EntityEventDecodeError| ProjectionError::apply(AUDIT_LOG_PROJECTION, env, e.to_string());

        match (current, env.payload()) {
            (Some(log), event) => log.apply(event).map_err(encode_failed),
            (None, EntityEvent::Created(created)) => AuditLog::initialize(created).map_err(encode_failed),
            (None, EntityEvent::Updated(_) | EntityEvent::DescriptionUpdated(_) | EntityEvent::Deleted(_)) => Err(
                ProjectionError::apply(AUDIT_LOG_PROJECTION, env, "stream has no audit log yet"),
            ),
        }
    }
}

#[async_trait]
impl<S> Projection for AuditLogProjection<S>
where
    S: DocumentStore<EntityId, AuditLog>,
{
    type Ev = EntityEvent;

    fn name(&self) -> &'static str {
        AUDIT_LOG_PROJECTION
    }

    async fn apply_batch(&self, batch: &[EventEnvelope<EntityEvent>]) -> Result<(), ProjectionError> {
        for (stream, events) in group_by_stream(batch) {
            let id = EntityId::new(stream);
            let mut current = self.store.get(&id).await?;
            for env in events {
                current = Some(Self::step(current, env)?);
            }
            if let Some(log) = current {
                debug!(entity_id = %id, entries = log.entries.len(), "audit log updated");
                self.store.upsert(id, log).await?;
            }
        }
        Ok(())
    }

    async fn reset(&self) -> Result<(), ProjectionError> {
        self.store.clear().await?;
        Ok(())
    }
}
