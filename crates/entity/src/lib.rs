//! Entity domain module (event-sourced).
//!
//! This crate contains the closed event catalog for one entity kind and the
//! aggregate fold, implemented purely as deterministic domain logic (no IO,
//! no storage).

pub mod entity;
pub mod events;

pub use entity::{Entity, EntityState};
pub use events::{
    ENTITY_STREAM_TYPE, EntityCreated, EntityDeleted, EntityDescriptionUpdated, EntityEvent,
    EntityEventDecodeError, EntityId, EntityUpdated,
};
