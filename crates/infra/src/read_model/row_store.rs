use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::StoreError;

/// Shape of one column in a flat table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub nullable: bool,
}

impl ColumnDef {
    pub const fn nullable(name: &'static str) -> Self {
        Self { name, nullable: true }
    }

    pub const fn not_null(name: &'static str) -> Self {
        Self { name, nullable: false }
    }
}

/// A flat table keyed by the stream identifier.
///
/// The key column is implicit; `columns` lists the remaining ones.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Null,
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl ColumnValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ColumnValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            ColumnValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

/// `column = value` in an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub column: &'static str,
    pub value: ColumnValue,
}

impl Assignment {
    pub fn text(column: &'static str, value: impl Into<String>) -> Self {
        Self {
            column,
            value: ColumnValue::Text(value.into()),
        }
    }

    pub fn bool(column: &'static str, value: bool) -> Self {
        Self {
            column,
            value: ColumnValue::Bool(value),
        }
    }
}

/// One stored row: every declared column, `Null` where never assigned.
pub type Row = BTreeMap<&'static str, ColumnValue>;

/// Column-oriented store for flat read models.
///
/// `upsert_columns` inserts a row when the key is new and otherwise touches only
/// the assigned columns, leaving the others as they were.
#[async_trait]
pub trait RowStore<K>: Send + Sync {
    async fn upsert_columns(&self, key: K, assignments: &[Assignment]) -> Result<(), StoreError>;

    /// Returns whether a row was removed.
    async fn delete(&self, key: &K) -> Result<bool, StoreError>;

    async fn get(&self, key: &K) -> Result<Option<Row>, StoreError>;

    /// All rows, in key order.
    async fn list(&self) -> Result<Vec<(K, Row)>, StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}

#[async_trait]
impl<K, S> RowStore<K> for Arc<S>
where
    S: RowStore<K> + ?Sized,
    K: Send + Sync + 'static,
{
    async fn upsert_columns(&self, key: K, assignments: &[Assignment]) -> Result<(), StoreError> {
        (**self).upsert_columns(key, assignments).await
    }

    async fn delete(&self, key: &K) -> Result<bool, StoreError> {
        (**self).delete(key).await
    }

    async fn get(&self, key: &K) -> Result<Option<Row>, StoreError> {
        (**self).get(key).await
    }

    async fn list(&self) -> Result<Vec<(K, Row)>, StoreError> {
        (**self).list().await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        (**self).clear().await
    }
}

/// In-memory row store for tests/dev.
///
/// Enforces the table definition: unknown columns are rejected, and a new row
/// must assign every non-nullable column.
#[derive(Debug)]
pub struct InMemoryRowStore<K> {
    table: TableDef,
    rows: RwLock<BTreeMap<K, Row>>,
}

impl<K> InMemoryRowStore<K> {
    pub fn new(table: TableDef) -> Self {
        Self {
            table,
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    fn validate(&self, assignments: &[Assignment]) -> Result<(), StoreError> {
        for a in assignments {
            let Some(column) = self.table.column(a.column) else {
                return Err(StoreError::UnknownColumn {
                    table: self.table.name,
                    column: a.column.to_string(),
                });
            };
            if !column.nullable && a.value == ColumnValue::Null {
                return Err(StoreError::NotNullViolation {
                    table: self.table.name,
                    column: column.name,
                });
            }
        }
        Ok(())
    }

    fn new_row(&self, assignments: &[Assignment]) -> Result<Row, StoreError> {
        let mut row: Row = self
            .table
            .columns
            .iter()
            .map(|c| (c.name, ColumnValue::Null))
            .collect();
        for a in assignments {
            row.insert(a.column, a.value.clone());
        }
        if let Some(missing) = self
            .table
            .columns
            .iter()
            .find(|c| !c.nullable && row.get(c.name) == Some(&ColumnValue::Null))
        {
            return Err(StoreError::NotNullViolation {
                table: self.table.name,
                column: missing.name,
            });
        }
        Ok(row)
    }
}

#[async_trait]
impl<K> RowStore<K> for InMemoryRowStore<K>
where
    K: Ord + Clone + Send + Sync + 'static,
{
    async fn upsert_columns(&self, key: K, assignments: &[Assignment]) -> Result<(), StoreError> {
        self.validate(assignments)?;

        let mut rows = self.rows.write().map_err(|_| StoreError::Poisoned)?;
        match rows.get_mut(&key) {
            Some(row) => {
                for a in assignments {
                    row.insert(a.column, a.value.clone());
                }
            }
            None => {
                let row = self.new_row(assignments)?;
                rows.insert(key, row);
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &K) -> Result<bool, StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::Poisoned)?;
        Ok(rows.remove(key).is_some())
    }

    async fn get(&self, key: &K) -> Result<Option<Row>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::Poisoned)?;
        Ok(rows.get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<(K, Row)>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::Poisoned)?;
        Ok(rows.iter().map(|(k, r)| (k.clone(), r.clone())).collect())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::Poisoned)?;
        rows.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEOPLE: TableDef = TableDef {
        name: "people",
        columns: &[
            ColumnDef::nullable("name"),
            ColumnDef::nullable("nickname"),
            ColumnDef::not_null("active"),
        ],
    };

    #[tokio::test]
    async fn insert_fills_unassigned_columns_with_null() {
        let store = InMemoryRowStore::<u32>::new(PEOPLE);
        store
            .upsert_columns(1, &[Assignment::text("name", "ada"), Assignment::bool("active", true)])
            .await
            .unwrap();

        let row = store.get(&1).await.unwrap().unwrap();
        assert_eq!(row["name"].as_text(), Some("ada"));
        assert_eq!(row["nickname"], ColumnValue::Null);
        assert_eq!(row["active"].as_bool(), Some(true));
    }

    #[tokio::test]
    async fn update_touches_only_assigned_columns() {
        let store = InMemoryRowStore::<u32>::new(PEOPLE);
        store
            .upsert_columns(
                1,
                &[
                    Assignment::text("name", "ada"),
                    Assignment::text("nickname", "countess"),
                    Assignment::bool("active", true),
                ],
            )
            .await
            .unwrap();
        store
            .upsert_columns(1, &[Assignment::text("nickname", "enchantress")])
            .await
            .unwrap();

        let row = store.get(&1).await.unwrap().unwrap();
        assert_eq!(row["name"].as_text(), Some("ada"));
        assert_eq!(row["nickname"].as_text(), Some("enchantress"));
    }

    #[tokio::test]
    async fn new_row_without_not_null_column_is_rejected() {
        let store = InMemoryRowStore::<u32>::new(PEOPLE);
        let err = store
            .upsert_columns(1, &[Assignment::text("name", "ada")])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::NotNullViolation {
                table: "people",
                column: "active"
            }
        );
        assert!(store.get(&1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_columns_are_rejected() {
        let store = InMemoryRowStore::<u32>::new(PEOPLE);
        let err = store
            .upsert_columns(1, &[Assignment::text("email", "ada@example.com")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }));
    }
}
