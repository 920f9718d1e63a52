//! Read model storage abstractions.
//!
//! Read models are disposable: they can be cleared and rebuilt from the event
//! log at any time. Each projection owns exactly one store.

pub mod document_store;
pub mod row_store;

use thiserror::Error;

use streamfold_events::ProjectionError;

pub use document_store::{DocumentFilter, DocumentStore, InMemoryDocumentStore};
pub use row_store::{Assignment, ColumnDef, ColumnValue, InMemoryRowStore, Row, RowStore, TableDef};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("read model lock poisoned")]
    Poisoned,

    #[error("table {table} has no column '{column}'")]
    UnknownColumn { table: &'static str, column: String },

    #[error("column {table}.{column} must not be null")]
    NotNullViolation {
        table: &'static str,
        column: &'static str,
    },
}

impl From<StoreError> for ProjectionError {
    fn from(err: StoreError) -> Self {
        ProjectionError::Store(err.to_string())
    }
}
