//! Application-facing operations over the write path and the read models.
//!
//! Writes go through the [`CommandDispatcher`]. Reads are served from each
//! projection's own store and may lag behind the log; an entity that has not
//! been projected yet reads as `None`.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;

use streamfold_entity::{
    Entity, EntityCreated, EntityDeleted, EntityDescriptionUpdated, EntityEvent, EntityId, EntityUpdated,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::projections::{
    AuditLog, AuditLogProjection, EntityStatus, EntityStatusProjection, FlatViewProjection, FlatViewRow,
};
use crate::read_model::{DocumentStore, RowStore, StoreError};

pub type AuditLogStore = Arc<dyn DocumentStore<EntityId, AuditLog>>;
pub type EntityStatusStore = Arc<dyn DocumentStore<EntityId, EntityStatus>>;
pub type FlatViewStore = Arc<dyn RowStore<EntityId>>;

/// One stored event as exposed by [`EntityService::history`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub event_type: String,
    pub version: u64,
    pub payload: JsonValue,
}

pub struct EntityService<S> {
    dispatcher: CommandDispatcher<S>,
    audit_log: Arc<AuditLogProjection<AuditLogStore>>,
    flat_view: Arc<FlatViewProjection<FlatViewStore>>,
    status: Arc<EntityStatusProjection<EntityStatusStore>>,
}

impl<S> EntityService<S>
where
    S: EventStore,
{
    /// The projections are shared with the daemon that keeps them up to date.
    pub fn new(
        dispatcher: CommandDispatcher<S>,
        audit_log: Arc<AuditLogProjection<AuditLogStore>>,
        flat_view: Arc<FlatViewProjection<FlatViewStore>>,
        status: Arc<EntityStatusProjection<EntityStatusStore>>,
    ) -> Self {
        Self {
            dispatcher,
            audit_log,
            flat_view,
            status,
        }
    }

    pub async fn create(&self, event: EntityCreated) -> Result<EntityId, DispatchError> {
        self.append(EntityEvent::Created(event)).await
    }

    pub async fn update(&self, event: EntityUpdated) -> Result<EntityId, DispatchError> {
        self.append(EntityEvent::Updated(event)).await
    }

    pub async fn update_description(&self, event: EntityDescriptionUpdated) -> Result<EntityId, DispatchError> {
        self.append(EntityEvent::DescriptionUpdated(event)).await
    }

    pub async fn delete(&self, event: EntityDeleted) -> Result<EntityId, DispatchError> {
        self.append(EntityEvent::Deleted(event)).await
    }

    async fn append(&self, event: EntityEvent) -> Result<EntityId, DispatchError> {
        let id = event.id();
        self.dispatcher.dispatch(event).await?;
        Ok(id)
    }

    pub async fn audit_log(&self, id: EntityId) -> Result<Option<AuditLog>, StoreError> {
        self.audit_log.get(id).await
    }

    pub async fn audit_logs(&self) -> Result<Vec<AuditLog>, StoreError> {
        self.audit_log.list().await
    }

    pub async fn status(&self, id: EntityId) -> Result<Option<EntityStatus>, StoreError> {
        self.status.get(id).await
    }

    pub async fn search_status(&self, phrase: &str) -> Result<Vec<EntityStatus>, StoreError> {
        self.status.search(phrase).await
    }

    pub async fn flat_row(&self, id: EntityId) -> Result<Option<FlatViewRow>, StoreError> {
        self.flat_view.get(id).await
    }

    pub async fn flat_rows(&self) -> Result<Vec<FlatViewRow>, StoreError> {
        self.flat_view.list().await
    }

    /// Current entity, folded from the full stream (always up to date).
    pub async fn entity(&self, id: EntityId) -> Result<Option<Entity>, DispatchError> {
        self.dispatcher.load(id).await
    }

    pub async fn history(&self, id: EntityId) -> Result<Vec<EventRecord>, DispatchError> {
        Ok(self
            .dispatcher
            .history(id)
            .await?
            .into_iter()
            .map(|stored| EventRecord {
                event_type: stored.event_type,
                version: stored.version,
                payload: stored.payload,
            })
            .collect())
    }
}
