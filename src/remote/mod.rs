// ============================================================================
// Remote Data Store Boundary
// ============================================================================
//
// The managed backend is consumed abstractly: query rows, apply an atomic
// batch of writes, and subscribe to change notifications. Rows travel as JSON
// objects keyed by camelCase column names, exactly as the backend's change
// feed delivers them; `typed` converts them to `model` records.
//
// ============================================================================

pub mod event;
pub mod memory;
pub mod query;
pub mod subscription;
pub mod typed;

pub use event::{ChangeEvent, EventKind, EventKinds};
pub use memory::InMemoryRemoteStore;
pub use query::{Condition, Filter, Order, Query};
pub use subscription::{Subscription, SubscriptionId};
pub use typed::{find_by_id, find_one, from_row, get_by_id, insert_op, select, to_row};

use crate::core::{ColabError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A single row as stored remotely.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Remote tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Table {
    Organization,
    Profile,
    Document,
    Revision,
    DocumentActivity,
    RevisionActivity,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Organization,
        Table::Profile,
        Table::Document,
        Table::Revision,
        Table::DocumentActivity,
        Table::RevisionActivity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Organization => "Organization",
            Table::Profile => "Profile",
            Table::Document => "Document",
            Table::Revision => "Revision",
            Table::DocumentActivity => "DocumentActivity",
            Table::RevisionActivity => "RevisionActivity",
        }
    }

    /// Columns besides `id` that must be unique across the table.
    pub fn unique_fields(&self) -> &'static [&'static str] {
        match self {
            Table::Organization => &["slug"],
            _ => &[],
        }
    }

    /// Audit tables only ever receive inserts.
    pub fn is_append_only(&self) -> bool {
        matches!(self, Table::DocumentActivity | Table::RevisionActivity)
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = ColabError;

    fn from_str(s: &str) -> Result<Self> {
        Table::ALL
            .into_iter()
            .find(|table| table.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ColabError::Validation(format!("unknown table '{}'", s)))
    }
}

/// One write inside an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Insert {
        table: Table,
        row: Row,
    },
    /// `matching` must select exactly one row; `patch` is merged onto it.
    Update {
        table: Table,
        matching: Filter,
        patch: Row,
    },
    /// Removes every row selected by `matching` (at least one).
    Delete {
        table: Table,
        matching: Filter,
    },
}

impl WriteOp {
    pub fn table(&self) -> Table {
        match self {
            WriteOp::Insert { table, .. } => *table,
            WriteOp::Update { table, .. } => *table,
            WriteOp::Delete { table, .. } => *table,
        }
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Reads rows matching `query`.
    async fn query(&self, query: Query) -> Result<Vec<Row>>;

    /// Applies every op or none of them. Returns the affected rows in op order
    /// (inserted row, updated row, deleted rows).
    async fn batch(&self, ops: Vec<WriteOp>) -> Result<Vec<Row>>;

    /// Opens a change feed for `table`, restricted to rows matching `filter`
    /// and to the requested event kinds.
    async fn subscribe(&self, table: Table, filter: Filter, kinds: EventKinds)
    -> Result<Subscription>;

    async fn insert(&self, table: Table, rows: Vec<Row>) -> Result<Vec<Row>> {
        let ops = rows
            .into_iter()
            .map(|row| WriteOp::Insert { table, row })
            .collect();
        self.batch(ops).await
    }

    async fn update(&self, table: Table, matching: Filter, patch: Row) -> Result<Row> {
        let mut rows = self
            .batch(vec![WriteOp::Update {
                table,
                matching,
                patch,
            }])
            .await?;
        rows.pop()
            .ok_or_else(|| ColabError::Remote(format!("update on {} returned no row", table)))
    }
}

/// Reads the `id` column of a row.
pub fn row_id(row: &Row) -> Option<uuid::Uuid> {
    row.get("id")
        .and_then(|value| value.as_str())
        .and_then(|raw| uuid::Uuid::parse_str(raw).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_parse_round() {
        assert_eq!("document".parse::<Table>().unwrap(), Table::Document);
        assert!("Widget".parse::<Table>().is_err());
    }

    #[test]
    fn test_row_id() {
        let id = uuid::Uuid::new_v4();
        let mut row = Row::new();
        row.insert("id".into(), serde_json::Value::String(id.to_string()));
        assert_eq!(row_id(&row), Some(id));
        assert_eq!(row_id(&Row::new()), None);
    }
}
