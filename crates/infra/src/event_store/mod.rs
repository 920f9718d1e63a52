//! Append-only event store boundary.
//!
//! Defines the infrastructure-facing abstraction for storing and reading event
//! streams without making any storage assumptions. Durable backends live
//! outside this crate; the in-memory store backs tests and local runs.

pub mod in_memory;
pub mod r#trait;

use async_trait::async_trait;
use tracing::warn;

use streamfold_core::{AggregateId, ExpectedVersion};
use streamfold_events::EventBus;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Adapter that announces the new log head on an `EventBus` after a successful
/// append.
///
/// Publish happens only after append succeeds. The message is the highest
/// committed sequence; workers treat it as a wake-up and read the events from
/// the store themselves.
///
/// A failed announcement never fails the append: the events are already
/// committed, and idle workers find them on their next poll.
pub struct PublishingEventStore<S, B> {
    store: S,
    bus: B,
}

impl<S, B> PublishingEventStore<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }
}

#[async_trait]
impl<S, B> EventStore for PublishingEventStore<S, B>
where
    S: EventStore,
    B: EventBus<u64>,
{
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        // 1) Append (durable step)
        let committed = self.store.append(events, expected_version).await?;

        // 2) Announce (best-effort; workers also poll)
        if let Some(last) = committed.last() {
            if let Err(err) = self.bus.publish(last.sequence) {
                warn!(sequence = last.sequence, error = ?err, "failed to announce appended events");
            }
        }

        Ok(committed)
    }

    async fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.store.load_stream(aggregate_id).await
    }

    async fn read_all(&self, after: u64, limit: usize) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.store.read_all(after, limit).await
    }

    async fn head(&self) -> Result<u64, EventStoreError> {
        self.store.head().await
    }
}
