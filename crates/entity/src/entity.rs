use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use streamfold_core::{Aggregate, AggregateRoot, DomainError, DomainResult, ValueObject};

use crate::events::{
    EntityCreated, EntityDeleted, EntityDescriptionUpdated, EntityEvent, EntityId, EntityUpdated,
};

/// Lifecycle of an entity that exists.
///
/// `NonExistent` is modelled as the absence of an `Entity` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityState {
    Active,
    Deleted,
}

/// Aggregate root: Entity.
///
/// Never stored; always recomputed by folding the entity's stream. Values are
/// immutable: every transition returns a new `Entity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    id: EntityId,
    name: String,
    description: String,
    user_id: String,
    occurred_at: DateTime<Utc>,
    is_deleted: bool,
    version: u64,
}

impl ValueObject for Entity {}

impl Entity {
    /// `NonExistent --Created--> Active`.
    pub fn create(event: &EntityCreated) -> DomainResult<Self> {
        require_text("name", &event.name)?;
        require_text("description", &event.description)?;

        Ok(Self {
            id: event.id,
            name: event.name.clone(),
            description: event.description.clone(),
            user_id: event.user_id.clone(),
            occurred_at: event.occurred_at,
            is_deleted: false,
            version: 1,
        })
    }

    /// Replay a whole stream.
    ///
    /// An empty stream is `DomainError::NotFound`.
    pub fn fold<'a>(events: impl IntoIterator<Item = &'a EntityEvent>) -> DomainResult<Self> {
        streamfold_core::fold::<Entity>(events)?.ok_or_else(DomainError::not_found)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn state(&self) -> EntityState {
        if self.is_deleted {
            EntityState::Deleted
        } else {
            EntityState::Active
        }
    }

    fn ensure_same_entity(&self, id: EntityId) -> DomainResult<()> {
        if self.id != id {
            return Err(DomainError::validation(format!(
                "event targets entity {id}, stream belongs to {}",
                self.id
            )));
        }
        Ok(())
    }

    fn ensure_not_removed(&self) -> DomainResult<()> {
        if self.is_deleted {
            return Err(DomainError::invalid_state("entity already removed"));
        }
        Ok(())
    }

    fn apply_updated(&self, event: &EntityUpdated) -> DomainResult<Self> {
        self.ensure_not_removed()?;
        require_text("name", &event.name)?;
        require_text("description", &event.description)?;

        Ok(Self {
            name: event.name.clone(),
            description: event.description.clone(),
            user_id: event.user_id.clone(),
            occurred_at: event.occurred_at,
            version: self.version + 1,
            ..self.clone()
        })
    }

    fn apply_description_updated(&self, event: &EntityDescriptionUpdated) -> DomainResult<Self> {
        self.ensure_not_removed()?;
        require_text("description", &event.description)?;

        Ok(Self {
            description: event.description.clone(),
            user_id: event.user_id.clone(),
            occurred_at: event.occurred_at,
            version: self.version + 1,
            ..self.clone()
        })
    }

    // Re-deleting is accepted; only the audit fields move.
    fn apply_deleted(&self, event: &EntityDeleted) -> DomainResult<Self> {
        Ok(Self {
            user_id: event.user_id.clone(),
            occurred_at: event.occurred_at,
            is_deleted: true,
            version: self.version + 1,
            ..self.clone()
        })
    }
}

fn require_text(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl AggregateRoot for Entity {
    type Id = EntityId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for Entity {
    type Event = EntityEvent;
    type Error = DomainError;

    fn initialize(event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            EntityEvent::Created(e) => Entity::create(e),
            // The stream must start with Created.
            EntityEvent::Updated(_) | EntityEvent::DescriptionUpdated(_) | EntityEvent::Deleted(_) => {
                Err(DomainError::not_found())
            }
        }
    }

    fn apply(&self, event: &Self::Event) -> Result<Self, Self::Error> {
        self.ensure_same_entity(event.id())?;

        match event {
            EntityEvent::Created(_) => Err(DomainError::conflict("entity already exists")),
            EntityEvent::Updated(e) => self.apply_updated(e),
            EntityEvent::DescriptionUpdated(e) => self.apply_description_updated(e),
            EntityEvent::Deleted(e) => self.apply_deleted(e),
        }
    }
}
