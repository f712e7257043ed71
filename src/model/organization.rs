//! Organization and profile records.
//!
//! Organizations are the top-level ownership boundary: every document belongs
//! to exactly one, and a profile belongs to exactly one for its lifetime.

use super::Record;
use crate::remote::Table;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    /// URL-safe unique identifier derived from the name (e.g. `acme-corp`).
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Organization {
    const TABLE: Table = Table::Organization;

    fn id(&self) -> Uuid {
        self.id
    }
}

/// A member of an organization. `id` is shared with the auth identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub organization_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Profile {
    const TABLE: Table = Table::Profile;

    fn id(&self) -> Uuid {
        self.id
    }
}
