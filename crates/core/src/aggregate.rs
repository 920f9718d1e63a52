//! Aggregate root and fold traits for event-sourced domain models.

use crate::error::{DomainError, DomainResult};

/// Aggregate root marker + minimal interface.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Number of events folded into this value.
    ///
    /// For event-sourced aggregates this equals the stream version of the last
    /// applied event.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for an aggregate stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (useful for migrations and imports).
    Any,
    /// The stream must not exist yet.
    NoStream,
    /// Require the stream to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::NoStream => actual == 0,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }

    /// Expectation for appending after a stream currently at `version`.
    pub fn after(version: u64) -> Self {
        if version == 0 {
            ExpectedVersion::NoStream
        } else {
            ExpectedVersion::Exact(version)
        }
    }
}

/// Fold semantics for an event-sourced aggregate (pure, deterministic).
///
/// The aggregate is an immutable value: `apply` returns the next value and leaves
/// `self` untouched, so a snapshot can be shared across concurrent replays.
///
/// - `initialize` is the `NonExistent -> Active` transition and only accepts the
///   stream's creation event.
/// - `apply` evolves an existing value and rejects events that are illegal in the
///   current state.
///
/// Implementations must not perform IO, read clocks or use randomness.
pub trait Aggregate: AggregateRoot + Sized {
    type Event: core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Build the initial value from the first event of a stream.
    fn initialize(event: &Self::Event) -> Result<Self, Self::Error>;

    /// Produce the next value from the current one and an event.
    fn apply(&self, event: &Self::Event) -> Result<Self, Self::Error>;
}

/// Advance an optional aggregate by one event.
///
/// `None` means the stream does not exist yet.
pub fn evolve<A>(state: Option<&A>, event: &A::Event) -> Result<A, A::Error>
where
    A: Aggregate,
{
    match state {
        None => A::initialize(event),
        Some(current) => current.apply(event),
    }
}

/// Reduce an ordered event sequence into the current aggregate value.
///
/// Returns `Ok(None)` for an empty sequence. Folding stops at the first rejected event.
pub fn fold<'a, A>(events: impl IntoIterator<Item = &'a A::Event>) -> Result<Option<A>, A::Error>
where
    A: Aggregate,
    A::Event: 'a,
{
    let mut state: Option<A> = None;
    for event in events {
        state = Some(evolve(state.as_ref(), event)?);
    }
    Ok(state)
}
