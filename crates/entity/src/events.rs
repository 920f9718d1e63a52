//! The entity event catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use streamfold_core::AggregateId;
use streamfold_events::Event;

/// Stream (aggregate) type stored alongside every entity event.
pub const ENTITY_STREAM_TYPE: &str = "entity";

/// Entity identifier; also the identifier of the entity's event stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub AggregateId);

impl EntityId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for EntityId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Event: EntityCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityCreated {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    pub user_id: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntityUpdated (full replacement of the descriptive fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityUpdated {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    pub user_id: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntityDescriptionUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDescriptionUpdated {
    pub id: EntityId,
    pub description: String,
    pub user_id: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntityDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDeleted {
    pub id: EntityId,
    pub user_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityEvent {
    Created(EntityCreated),
    Updated(EntityUpdated),
    DescriptionUpdated(EntityDescriptionUpdated),
    Deleted(EntityDeleted),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityEventDecodeError {
    #[error("unknown entity event type '{0}'")]
    UnknownEventType(String),

    #[error("malformed {event_type} payload: {reason}")]
    Malformed { event_type: String, reason: String },

    #[error("failed to encode {event_type} payload: {reason}")]
    Encode { event_type: String, reason: String },
}

impl EntityEvent {
    pub const CREATED: &'static str = "entity.created";
    pub const UPDATED: &'static str = "entity.updated";
    pub const DESCRIPTION_UPDATED: &'static str = "entity.description_updated";
    pub const DELETED: &'static str = "entity.deleted";

    pub fn id(&self) -> EntityId {
        match self {
            EntityEvent::Created(e) => e.id,
            EntityEvent::Updated(e) => e.id,
            EntityEvent::DescriptionUpdated(e) => e.id,
            EntityEvent::Deleted(e) => e.id,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            EntityEvent::Created(e) => &e.user_id,
            EntityEvent::Updated(e) => &e.user_id,
            EntityEvent::DescriptionUpdated(e) => &e.user_id,
            EntityEvent::Deleted(e) => &e.user_id,
        }
    }

    /// Serialize the variant body (without the enum tag) as stored in the log.
    pub fn to_payload(&self) -> Result<JsonValue, EntityEventDecodeError> {
        let encoded = match self {
            EntityEvent::Created(e) => serde_json::to_value(e),
            EntityEvent::Updated(e) => serde_json::to_value(e),
            EntityEvent::DescriptionUpdated(e) => serde_json::to_value(e),
            EntityEvent::Deleted(e) => serde_json::to_value(e),
        };
        encoded.map_err(|e| EntityEventDecodeError::Encode {
            event_type: self.event_type().to_string(),
            reason: e.to_string(),
        })
    }

    /// Rebuild a typed event from its stored type name and payload.
    ///
    /// Unknown type names are an error rather than being skipped.
    pub fn decode(event_type: &str, payload: JsonValue) -> Result<Self, EntityEventDecodeError> {
        let malformed = |e: serde_json::Error| EntityEventDecodeError::Malformed {
            event_type: event_type.to_string(),
            reason: e.to_string(),
        };

        match event_type {
            Self::CREATED => serde_json::from_value(payload)
                .map(EntityEvent::Created)
                .map_err(malformed),
            Self::UPDATED => serde_json::from_value(payload)
                .map(EntityEvent::Updated)
                .map_err(malformed),
            Self::DESCRIPTION_UPDATED => serde_json::from_value(payload)
                .map(EntityEvent::DescriptionUpdated)
                .map_err(malformed),
            Self::DELETED => serde_json::from_value(payload)
                .map(EntityEvent::Deleted)
                .map_err(malformed),
            other => Err(EntityEventDecodeError::UnknownEventType(other.to_string())),
        }
    }
}

impl Event for EntityEvent {
    fn event_type(&self) -> &'static str {
        match self {
            EntityEvent::Created(_) => Self::CREATED,
            EntityEvent::Updated(_) => Self::UPDATED,
            EntityEvent::DescriptionUpdated(_) => Self::DESCRIPTION_UPDATED,
            EntityEvent::Deleted(_) => Self::DELETED,
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            EntityEvent::Created(e) => e.occurred_at,
            EntityEvent::Updated(e) => e.occurred_at,
            EntityEvent::DescriptionUpdated(e) => e.occurred_at,
            EntityEvent::Deleted(e) => e.occurred_at,
        }
    }

    fn aggregate_id(&self) -> AggregateId {
        self.id().0
    }
}
