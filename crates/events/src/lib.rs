//! Event mechanics shared by the write path and the projections.
//!
//! Nothing in here knows about a concrete event catalog or storage backend.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod projection;
pub mod runner;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::InMemoryEventBus;
pub use projection::{Projection, ProjectionError};
pub use runner::{ProjectionCursor, group_by_stream, sort_by_sequence};
