use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use streamfold_core::{AggregateId, EventId};

/// Envelope for an event, containing stream and log metadata.
///
/// This is the unit projections consume.
///
/// Notes:
/// - `version` is the position inside the aggregate stream (1, 2, 3, ...).
/// - `sequence` is the position inside the store-wide log. It is monotonic across
///   all streams and is what batch consumers order by.
/// - `payload` is either the raw stored payload or a decoded domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: EventId,

    aggregate_id: AggregateId,
    aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    version: u64,

    /// Monotonically increasing position in the global log.
    sequence: u64,

    event_type: String,
    occurred_at: DateTime<Utc>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_id: EventId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        version: u64,
        sequence: u64,
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            version,
            sequence,
            event_type: event_type.into(),
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    /// Replace the payload, keeping all metadata (e.g. after decoding).
    pub fn try_map<F, T, Err>(self, f: F) -> Result<EventEnvelope<T>, Err>
    where
        F: FnOnce(&str, E) -> Result<T, Err>,
    {
        let payload = f(&self.event_type, self.payload)?;
        Ok(EventEnvelope {
            event_id: self.event_id,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            version: self.version,
            sequence: self.sequence,
            event_type: self.event_type,
            occurred_at: self.occurred_at,
            payload,
        })
    }
}
