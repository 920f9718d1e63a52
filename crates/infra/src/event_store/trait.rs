use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use streamfold_core::{AggregateId, EventId, ExpectedVersion};
use streamfold_events::{Event, EventEnvelope};

/// An event ready to be appended to a stream (no positions assigned yet).
///
/// Events go through this lifecycle:
///
/// 1. **Domain event**: decided by the command dispatcher against the folded aggregate
/// 2. **UncommittedEvent**: encoded payload plus stream metadata
/// 3. **StoredEvent**: persisted with a stream `version` and a global `sequence`
/// 4. **EventEnvelope**: read back by projection workers, decoded per batch
///
/// The payload is the event body only. The type name travels next to it in
/// `event_type` and is what decoding dispatches on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: EventId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl UncommittedEvent {
    /// Wrap an already-encoded payload with the typed event's metadata.
    pub fn from_typed<E: Event>(
        event_id: EventId,
        aggregate_type: impl Into<String>,
        event: &E,
        payload: JsonValue,
    ) -> Self {
        Self {
            event_id,
            aggregate_id: event.aggregate_id(),
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        }
    }
}

/// A persisted event.
///
/// Positions are assigned by the store during append and never change:
/// - `version` is the position inside the stream (1, 2, 3, ...), used for
///   optimistic concurrency
/// - `sequence` is the position inside the store-wide log, strictly increasing
///   across all streams, used by projection checkpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: EventId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub version: u64,
    pub sequence: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    /// Convert into the raw envelope projection workers decode.
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            self.event_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.version,
            self.sequence,
            self.event_type.clone(),
            self.occurred_at,
            self.payload.clone(),
        )
    }
}

/// Event store operation error.
///
/// These are infrastructure errors (storage, concurrency) as opposed to domain
/// errors (validation, invariants).
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("event store unavailable: {0}")]
    Unavailable(String),
}

/// Append-only event log, organized into streams (one stream per entity).
///
/// ## Append semantics
///
/// `append()`:
/// - requires every event of the batch to target the same stream
/// - checks `ExpectedVersion` against the current stream version
/// - assigns stream versions starting at `current + 1` and global sequences
///   starting at `head + 1`
/// - persists the batch atomically (all or nothing)
///
/// ## Read semantics
///
/// - `load_stream()` returns one stream in version order (empty when unknown)
/// - `read_all()` returns up to `limit` events with `sequence > after`, in
///   sequence order; this is the feed projection workers page through
/// - `head()` is the highest assigned sequence (`0` for an empty log)
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    async fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError>;

    async fn read_all(&self, after: u64, limit: usize) -> Result<Vec<StoredEvent>, EventStoreError>;

    async fn head(&self) -> Result<u64, EventStoreError>;
}

#[async_trait]
impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version).await
    }

    async fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(aggregate_id).await
    }

    async fn read_all(&self, after: u64, limit: usize) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).read_all(after, limit).await
    }

    async fn head(&self) -> Result<u64, EventStoreError> {
        (**self).head().await
    }
}
