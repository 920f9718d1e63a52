//! Infrastructure layer: event store boundary, read model stores, projections,
//! the projection daemon and the write path.

pub mod command_dispatcher;
pub mod config;
pub mod entity_service;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod workers;


pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use config::{ConfigError, DaemonConfig, ErrorPolicy};
pub use entity_service::{EntityService, EventRecord};
pub use workers::{DaemonError, ProjectionDaemon, ProjectionHealth};
