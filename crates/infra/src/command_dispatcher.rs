//! Write path: validate an event against the folded entity and append it.
//!
//! ```text
//! EntityEvent
//!   ↓
//! 1. Load the entity's stream
//!   ↓
//! 2. Rehydrate (fold history into the current Entity, if any)
//!   ↓
//! 3. Decide: the event must be a legal transition from the current state
//!   ↓
//! 4. Append with an optimistic concurrency check against the loaded version
//! ```
//!
//! A rejected event is never appended, so a failed fold leaves no trace in the
//! log. Announcing the append to projection workers is the store adapter's job
//! (`PublishingEventStore`).

use thiserror::Error;
use tracing::{info, warn};

use streamfold_core::{AggregateId, DomainError, EventId, ExpectedVersion, evolve, fold};
use streamfold_entity::{ENTITY_STREAM_TYPE, Entity, EntityEvent, EntityId};
use streamfold_events::Event;

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// An event field failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The entity's lifecycle state does not accept the event.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The stream does not exist (or does not start with a creation event).
    #[error("entity not found")]
    NotFound,

    /// The event contradicts the stream (e.g. creating an existing entity).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Another writer appended to the stream after it was loaded.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// A stored payload could not be decoded into an entity event.
    #[error("failed to decode stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => DispatchError::Validation(msg),
            DomainError::InvalidState(msg) => DispatchError::InvalidState(msg),
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
        }
    }
}

/// Appends entity events after checking them against the folded stream.
///
/// ## Concurrency
///
/// The append expects the stream version that was loaded. If another writer got
/// in between, the append fails with `DispatchError::Concurrency`; callers retry
/// by dispatching again (which reloads) or surface the conflict.
#[derive(Debug)]
pub struct CommandDispatcher<S> {
    store: S,
}

impl<S> CommandDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> CommandDispatcher<S>
where
    S: EventStore,
{
    /// Validate `event` against the current entity and append it to its stream.
    ///
    /// Returns the committed event with its assigned positions.
    pub async fn dispatch(&self, event: EntityEvent) -> Result<StoredEvent, DispatchError> {
        let entity_id = event.id();

        // 1) Load history
        let history = self.store.load_stream(entity_id.0).await?;
        validate_loaded_stream(entity_id.0, &history)?;
        let expected = ExpectedVersion::after(stream_version(&history));

        // 2) Rehydrate
        let current = rehydrate(&history)?;

        // 3) Decide
        let next = evolve(current.as_ref(), &event).map_err(|err| {
            warn!(entity_id = %entity_id, event_type = event.event_type(), error = %err, "event rejected");
            DispatchError::from(err)
        })?;

        // 4) Persist
        let payload = event.to_payload().map_err(|e| {
            DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "payload serialization failed: {e}"
            )))
        })?;
        let uncommitted = UncommittedEvent::from_typed(EventId::new(), ENTITY_STREAM_TYPE, &event, payload);

        let stored = self
            .store
            .append(vec![uncommitted], expected)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                DispatchError::Store(EventStoreError::InvalidAppend(
                    "store committed no events".to_string(),
                ))
            })?;

        info!(
            entity_id = %entity_id,
            event_type = %stored.event_type,
            version = stored.version,
            sequence = stored.sequence,
            is_deleted = next.is_deleted(),
            "event appended"
        );
        Ok(stored)
    }

    /// Fold the full stream into the current entity (`None` for an unknown id).
    pub async fn load(&self, id: EntityId) -> Result<Option<Entity>, DispatchError> {
        let history = self.history(id).await?;
        rehydrate(&history)
    }

    /// The raw stored stream, in version order.
    pub async fn history(&self, id: EntityId) -> Result<Vec<StoredEvent>, DispatchError> {
        let history = self.store.load_stream(id.0).await?;
        validate_loaded_stream(id.0, &history)?;
        Ok(history)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.version).unwrap_or(0)
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), DispatchError> {
    // Versions must be exactly 1, 2, 3, ... for the fold to be meaningful.
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.version != idx as u64 + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "unexpected stream version at index {idx} (found {})",
                e.version
            ))));
        }
    }
    Ok(())
}

fn rehydrate(history: &[StoredEvent]) -> Result<Option<Entity>, DispatchError> {
    let events = history
        .iter()
        .map(|stored| {
            EntityEvent::decode(&stored.event_type, stored.payload.clone())
                .map_err(|e| DispatchError::Deserialize(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(fold::<Entity>(&events)?)
}
