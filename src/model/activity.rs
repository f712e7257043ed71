//! Append-only audit rows.
//!
//! Activity rows are written in the same batch as the change they describe and
//! are never updated or deleted afterwards.

use super::Record;
use crate::remote::Table;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentActionType {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevisionActionType {
    Created,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentActivity {
    pub id: Uuid,
    pub action_type: DocumentActionType,
    pub actor_id: Uuid,
    pub document_id: Uuid,
    pub organization_id: Uuid,
    #[serde(default)]
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Record for DocumentActivity {
    const TABLE: Table = Table::DocumentActivity;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionActivity {
    pub id: Uuid,
    pub action_type: RevisionActionType,
    pub actor_id: Uuid,
    pub revision_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Record for RevisionActivity {
    const TABLE: Table = Table::RevisionActivity;

    fn id(&self) -> Uuid {
        self.id
    }
}
