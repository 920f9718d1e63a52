//! Ordering and progress tracking for batch consumers.
//!
//! Read models are **disposable**; events are the source of truth.
//! These helpers keep replay deterministic without making storage assumptions.

use std::collections::BTreeMap;

use streamfold_core::AggregateId;

use crate::{EventEnvelope, ProjectionError};

/// Tracks how far a consumer has read the global log.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ProjectionCursor {
    last_sequence: u64,
}

impl ProjectionCursor {
    /// Resume from a persisted checkpoint (`0` means "from the beginning").
    pub fn at(last_sequence: u64) -> Self {
        Self { last_sequence }
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Verify that a batch continues strictly after the cursor and return the
    /// position the cursor would move to.
    ///
    /// Gaps are allowed (the log may skip positions); going backwards is not.
    pub fn check_batch<E>(&self, batch: &[EventEnvelope<E>]) -> Result<u64, ProjectionError> {
        let mut last = self.last_sequence;
        for env in batch {
            if env.sequence() <= last {
                return Err(ProjectionError::NonMonotonicSequence {
                    last,
                    found: env.sequence(),
                });
            }
            last = env.sequence();
        }
        Ok(last)
    }

    pub fn advance_to(&mut self, sequence: u64) {
        if sequence > self.last_sequence {
            self.last_sequence = sequence;
        }
    }
}

/// Order a mixed batch by global sequence number.
///
/// The sort is stable, so envelopes that share a sequence (which a well-behaved
/// store never produces) keep their delivery order.
pub fn sort_by_sequence<E>(batch: &[EventEnvelope<E>]) -> Vec<&EventEnvelope<E>> {
    let mut ordered: Vec<_> = batch.iter().collect();
    ordered.sort_by_key(|env| env.sequence());
    ordered
}

/// Split a batch into per-stream runs, each ordered by stream version.
pub fn group_by_stream<E>(batch: &[EventEnvelope<E>]) -> BTreeMap<AggregateId, Vec<&EventEnvelope<E>>> {
    let mut streams: BTreeMap<AggregateId, Vec<&EventEnvelope<E>>> = BTreeMap::new();
    for env in batch {
        streams.entry(env.aggregate_id()).or_default().push(env);
    }
    for events in streams.values_mut() {
        events.sort_by_key(|env| env.version());
    }
    streams
}
