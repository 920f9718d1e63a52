use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::trace;

use streamfold_entity::{EntityEvent, EntityId};
use streamfold_events::{EventEnvelope, Projection, ProjectionError, sort_by_sequence};

use crate::read_model::{Assignment, ColumnDef, ColumnValue, Row, RowStore, StoreError, TableDef};

pub const FLAT_VIEW_PROJECTION: &str = "entity.flat_view";

pub const USER_ID: &str = "user_id";
pub const OCCURRED_AT: &str = "occurred_at";
pub const IS_DELETED: &str = "is_deleted";
pub const NAME: &str = "name";
pub const DESCRIPTION: &str = "description";

/// `entity_flat_view`: one row per live entity, keyed by the entity id.
pub const FLAT_VIEW_TABLE: TableDef = TableDef {
    name: "entity_flat_view",
    columns: &[
        ColumnDef::nullable(USER_ID),
        ColumnDef::nullable(OCCURRED_AT),
        ColumnDef::not_null(IS_DELETED),
        ColumnDef::nullable(NAME),
        ColumnDef::nullable(DESCRIPTION),
    ],
};

/// What a single event does to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowAction {
    Upsert(Vec<Assignment>),
    Delete,
    Ignore,
}

/// Event-to-row mapping for the flat view.
///
/// `occurred_at` is declared but no event maps it, so it stays null.
pub fn row_action(event: &EntityEvent) -> RowAction {
    match event {
        EntityEvent::Created(e) => RowAction::Upsert(vec![
            Assignment::text(NAME, &e.name),
            Assignment::text(DESCRIPTION, &e.description),
            Assignment::text(USER_ID, &e.user_id),
            Assignment::bool(IS_DELETED, false),
        ]),
        EntityEvent::DescriptionUpdated(e) => RowAction::Upsert(vec![
            Assignment::text(DESCRIPTION, &e.description),
            Assignment::text(USER_ID, &e.user_id),
            Assignment::bool(IS_DELETED, false),
        ]),
        EntityEvent::Deleted(_) => RowAction::Delete,
        // Full updates are not mapped: the row keeps the created name until a
        // mapping for them is agreed on.
        EntityEvent::Updated(_) => RowAction::Ignore,
    }
}

/// Typed view of an `entity_flat_view` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatViewRow {
    pub id: EntityId,
    pub user_id: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl FlatViewRow {
    pub fn from_row(id: EntityId, row: &Row) -> Self {
        let text = |column: &str| row.get(column).and_then(ColumnValue::as_text).map(str::to_string);
        Self {
            id,
            user_id: text(USER_ID),
            occurred_at: row.get(OCCURRED_AT).and_then(ColumnValue::as_timestamp),
            is_deleted: row.get(IS_DELETED).and_then(ColumnValue::as_bool).unwrap_or(false),
            name: text(NAME),
            description: text(DESCRIPTION),
        }
    }
}

/// Flat relational view of live entities.
///
/// Events are applied one at a time in global sequence order. Every action is an
/// upsert or a delete, so re-applying a batch converges to the same table.
#[derive(Debug)]
pub struct FlatViewProjection<S> {
    store: S,
}

impl<S> FlatViewProjection<S>
where
    S: RowStore<EntityId>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: EntityId) -> Result<Option<FlatViewRow>, StoreError> {
        Ok(self.store.get(&id).await?.map(|row| FlatViewRow::from_row(id, &row)))
    }

    pub async fn list(&self) -> Result<Vec<FlatViewRow>, StoreError> {
        Ok(self
            .store
            .list()
            .await?
            .iter()
            .map(|(id, row)| FlatViewRow::from_row(*id, row))
            .collect())
    }
}

#[async_trait]
impl<S> Projection for FlatViewProjection<S>
where
    S: RowStore<EntityId>,
{
    type Ev = EntityEvent;

    fn name(&self) -> &'static str {
        FLAT_VIEW_PROJECTION
    }

    async fn apply_batch(&self, batch: &[EventEnvelope<EntityEvent>]) -> Result<(), ProjectionError> {
        for env in sort_by_sequence(batch) {
            let id = env.payload().id();
            match row_action(env.payload()) {
                RowAction::Upsert(assignments) => {
                    self.store
                        .upsert_columns(id, &assignments)
                        .await
                        .map_err(|e| ProjectionError::apply(FLAT_VIEW_PROJECTION, env, e.to_string()))?;
                }
                RowAction::Delete => {
                    self.store.delete(&id).await?;
                }
                RowAction::Ignore => {
                    trace!(entity_id = %id, event_type = env.event_type(), "event not mapped to the flat view");
                }
            }
        }
        Ok(())
    }

    async fn reset(&self) -> Result<(), ProjectionError> {
        self.store.clear().await?;
        Ok(())
    }
}
