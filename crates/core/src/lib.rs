//! `streamfold-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error taxonomy and the fold traits every
//! event-sourced aggregate implements.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion, evolve, fold};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, EventId};
pub use value_object::ValueObject;
