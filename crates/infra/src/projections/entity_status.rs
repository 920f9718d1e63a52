use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use streamfold_core::ValueObject;
use streamfold_entity::{EntityCreated, EntityDescriptionUpdated, EntityEvent, EntityId, EntityUpdated};
use streamfold_events::{EventEnvelope, Projection, ProjectionError, sort_by_sequence};

use crate::read_model::{DocumentStore, StoreError};

pub const ENTITY_STATUS_PROJECTION: &str = "entity.status";

/// Latest known state of a live entity.
///
/// `version` is the stream version of the last event applied to the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStatus {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    pub version: u64,
    pub user_id: String,
    pub occurred_at: DateTime<Utc>,
    pub is_deleted: bool,
}

impl ValueObject for EntityStatus {}

impl EntityStatus {
    pub fn created(e: &EntityCreated, version: u64) -> Self {
        Self {
            id: e.id,
            name: e.name.clone(),
            description: e.description.clone(),
            version,
            user_id: e.user_id.clone(),
            occurred_at: e.occurred_at,
            is_deleted: false,
        }
    }

    pub fn updated(e: &EntityUpdated, version: u64) -> Self {
        Self {
            id: e.id,
            name: e.name.clone(),
            description: e.description.clone(),
            version,
            user_id: e.user_id.clone(),
            occurred_at: e.occurred_at,
            is_deleted: false,
        }
    }

    /// Copy with the description-related fields replaced.
    pub fn with_description(&self, e: &EntityDescriptionUpdated, version: u64) -> Self {
        Self {
            description: e.description.clone(),
            user_id: e.user_id.clone(),
            occurred_at: e.occurred_at,
            version,
            ..self.clone()
        }
    }

    /// Case-insensitive substring match over name and description.
    pub fn matches_phrase(&self, phrase: &str) -> bool {
        let needle = phrase.to_lowercase();
        self.name.to_lowercase().contains(&needle) || self.description.to_lowercase().contains(&needle)
    }
}

/// Current-state projection: one [`EntityStatus`] per live entity.
///
/// A batch may mix streams in any order; it is re-sorted by global sequence
/// before anything is written.
#[derive(Debug)]
pub struct EntityStatusProjection<S> {
    store: S,
}

impl<S> EntityStatusProjection<S>
where
    S: DocumentStore<EntityId, EntityStatus>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: EntityId) -> Result<Option<EntityStatus>, StoreError> {
        self.store.get(&id).await
    }

    /// Statuses whose name or description contains `phrase`. A blank phrase
    /// matches nothing.
    pub async fn search(&self, phrase: &str) -> Result<Vec<EntityStatus>, StoreError> {
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return Ok(vec![]);
        }
        self.store.query(&|status: &EntityStatus| status.matches_phrase(phrase)).await
    }

    async fn apply_one(&self, env: &EventEnvelope<EntityEvent>) -> Result<(), ProjectionError> {
        match env.payload() {
            EntityEvent::Created(e) => {
                self.store.upsert(e.id, EntityStatus::created(e, env.version())).await?;
            }
            EntityEvent::Updated(e) => {
                self.store.upsert(e.id, EntityStatus::updated(e, env.version())).await?;
            }
            EntityEvent::DescriptionUpdated(e) => {
                // Step 1: read. A miss means the entity was never created or is
                // already removed; nothing to merge into.
                let Some(current) = self.store.get(&e.id).await? else {
                    debug!(
                        entity_id = %e.id,
                        sequence = env.sequence(),
                        "no status record for description update, skipping"
                    );
                    return Ok(());
                };

                // Step 2: write the merged record.
                self.store
                    .upsert(e.id, current.with_description(e, env.version()))
                    .await?;
            }
            EntityEvent::Deleted(e) => {
                self.store.delete(&e.id).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<S> Projection for EntityStatusProjection<S>
where
    S: DocumentStore<EntityId, EntityStatus>,
{
    type Ev = EntityEvent;

    fn name(&self) -> &'static str {
        ENTITY_STATUS_PROJECTION
    }

    async fn apply_batch(&self, batch: &[EventEnvelope<EntityEvent>]) -> Result<(), ProjectionError> {
        for env in sort_by_sequence(batch) {
            self.apply_one(env).await?;
        }
        Ok(())
    }

    async fn reset(&self) -> Result<(), ProjectionError> {
        self.store.clear().await?;
        Ok(())
    }
}
