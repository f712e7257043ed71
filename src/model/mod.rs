// ============================================================================
// Domain Model
// ============================================================================
//
// Server-owned entities (rows as the remote store holds them) and the view
// shapes the client cache stores for each query.
//
// ============================================================================

pub mod activity;
pub mod document;
pub mod organization;
pub mod revision;
pub mod views;

pub use activity::{DocumentActionType, DocumentActivity, RevisionActionType, RevisionActivity};
pub use document::Document;
pub use organization::{Organization, Profile};
pub use revision::{Revision, RevisionStatus};
pub use views::{
    ActivityFeed, ActivityView, DocumentDetail, DocumentRef, DocumentSummary, DocumentsPage,
    ProfileRef, RevisionActivityView, RevisionCounts, RevisionView,
};

use crate::remote::Table;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// A server-owned entity stored as one row of a remote table.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: Table;

    fn id(&self) -> Uuid;
}
