//! Background workers.

pub mod projection_worker;

pub use projection_worker::{DaemonError, EntityProjection, ProjectionDaemon, ProjectionHealth};
