use super::Record;
use crate::remote::Table;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A document owned by an organization.
///
/// Deletion is soft: `deleted_at` is set and the row stays in the table, so
/// list queries filter on `deletedAt IS NULL`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
    pub organization_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Record for Document {
    const TABLE: Table = Table::Document;

    fn id(&self) -> Uuid {
        self.id
    }
}
