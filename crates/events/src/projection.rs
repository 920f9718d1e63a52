use async_trait::async_trait;
use thiserror::Error;

use crate::{Event, EventEnvelope};

/// Failure while building a read model.
///
/// Projection errors are never surfaced to the writer that appended the event.
/// They are reported through the projection daemon's health signal and halt the
/// affected projection until it is rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("projection {projection} failed to apply {event_type} at sequence {sequence}: {reason}")]
    Apply {
        projection: String,
        event_type: String,
        sequence: u64,
        reason: String,
    },

    #[error("failed to deserialize {event_type} at sequence {sequence}: {reason}")]
    Deserialize {
        event_type: String,
        sequence: u64,
        reason: String,
    },

    #[error("unknown event type '{event_type}' at sequence {sequence}")]
    UnknownEvent { event_type: String, sequence: u64 },

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("read model store failure: {0}")]
    Store(String),
}

impl ProjectionError {
    /// Build an `Apply` error for the given envelope.
    pub fn apply<E>(projection: &str, envelope: &EventEnvelope<E>, reason: impl Into<String>) -> Self {
        Self::Apply {
            projection: projection.to_string(),
            event_type: envelope.event_type().to_string(),
            sequence: envelope.sequence(),
            reason: reason.into(),
        }
    }

    /// Whether this error comes from decoding rather than applying.
    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Deserialize { .. })
    }

    pub fn is_unknown_event(&self) -> bool {
        matches!(self, Self::UnknownEvent { .. })
    }
}

/// A projection builds a read model from the append-only event log.
///
/// Projections are driven in batches by a background worker that owns both the
/// projection and its checkpoint. A batch holds events from any number of
/// streams in global log order; each stream's events appear in stream order.
///
/// ## Idempotency
///
/// Delivery is at-least-once: a batch that was interrupted before its checkpoint
/// was saved is delivered again. Applying the same envelope twice must leave the
/// read model as if it had been applied once (upserts, deletes, set-unions).
///
/// ## Ownership
///
/// Each projection exclusively owns its read model store. No projection reads
/// another projection's storage.
#[async_trait]
pub trait Projection: Send + Sync {
    type Ev: Event;

    /// Stable name, used for checkpoints, health and logs.
    fn name(&self) -> &'static str;

    /// Apply a batch of envelopes to the read model.
    ///
    /// Returning an error means the batch must not be checkpointed. Side effects
    /// already written for earlier envelopes of the batch stay in place; they are
    /// re-applied idempotently on retry.
    async fn apply_batch(&self, batch: &[EventEnvelope<Self::Ev>]) -> Result<(), ProjectionError>;

    /// Drop every record of the read model (rebuild support).
    async fn reset(&self) -> Result<(), ProjectionError>;
}
