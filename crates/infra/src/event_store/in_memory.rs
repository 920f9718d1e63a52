use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use streamfold_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Default)]
struct Log {
    /// Every committed event, in sequence order (`sequence == index + 1`).
    events: Vec<StoredEvent>,
    /// Indexes into `events`, per stream, in version order.
    streams: HashMap<AggregateId, Vec<usize>>,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    log: RwLock<Log>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> EventStoreError {
        EventStoreError::Unavailable("lock poisoned".to_string())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };

        // All events must target the same stream.
        let aggregate_id = first.aggregate_id;
        let aggregate_type = first.aggregate_type.clone();

        for (idx, e) in events.iter().enumerate() {
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let mut log = self.log.write().map_err(|_| Self::poisoned())?;
        let Log { events: all, streams } = &mut *log;

        let existing_stream = streams.get(&aggregate_id);
        let current = existing_stream.map_or(0, |stream| stream.len() as u64);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        // Enforce aggregate type stability across the stream.
        if let Some(existing) = existing_stream.and_then(|stream| stream.first()).map(|&idx| &all[idx]) {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        // Only a validated append creates the stream entry.
        let stream = streams.entry(aggregate_id).or_default();
        let mut committed = Vec::with_capacity(events.len());
        for (offset, e) in events.into_iter().enumerate() {
            let index = all.len();
            let stored = StoredEvent {
                event_id: e.event_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                version: current + offset as u64 + 1,
                sequence: index as u64 + 1,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            all.push(stored.clone());
            stream.push(index);
            committed.push(stored);
        }

        Ok(committed)
    }

    async fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let log = self.log.read().map_err(|_| Self::poisoned())?;

        Ok(log
            .streams
            .get(&aggregate_id)
            .map(|indexes| indexes.iter().map(|&idx| log.events[idx].clone()).collect())
            .unwrap_or_default())
    }

    async fn read_all(&self, after: u64, limit: usize) -> Result<Vec<StoredEvent>, EventStoreError> {
        let log = self.log.read().map_err(|_| Self::poisoned())?;

        // sequence == index + 1, so the first event after `after` sits at index `after`.
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(log.events.len());
        Ok(log.events[start..].iter().take(limit).cloned().collect())
    }

    async fn head(&self) -> Result<u64, EventStoreError> {
        let log = self.log.read().map_err(|_| Self::poisoned())?;
        Ok(log.events.len() as u64)
    }
}
