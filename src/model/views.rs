//! Cached view shapes.
//!
//! Each shape mirrors what one read query selects, including denormalized
//! relations (author email, document title) that raw change events do not
//! carry. Collections are `im::Vector`s so cache snapshots share structure
//! with the live value instead of deep-copying it.

use super::{
    Document, DocumentActionType, DocumentActivity, Profile, Revision, RevisionActionType,
    RevisionActivity, RevisionStatus,
};
use chrono::{DateTime, Utc};
use im::Vector;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Nested author/actor sub-object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRef {
    pub id: Uuid,
    pub email: String,
}

impl ProfileRef {
    pub fn new(id: Uuid, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
        }
    }
}

impl From<&Profile> for ProfileRef {
    fn from(profile: &Profile) -> Self {
        Self::new(profile.id, profile.email.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
    pub id: Uuid,
    pub title: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionCounts {
    pub pending_revisions: u32,
}

// ---------------------------------------------------------------------------
// Document list
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
    pub author: ProfileRef,
    #[serde(rename = "_count")]
    pub counts: RevisionCounts,
}

impl DocumentSummary {
    pub fn from_document(document: &Document, author: ProfileRef, pending_revisions: u32) -> Self {
        Self {
            id: document.id,
            title: document.title.clone(),
            content: document.content.clone(),
            updated_at: document.updated_at,
            author,
            counts: RevisionCounts { pending_revisions },
        }
    }
}

/// One window of the organization's document list, newest update first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentsPage {
    pub documents: Vector<DocumentSummary>,
    pub next_cursor: Option<Uuid>,
}

impl DocumentsPage {
    pub fn contains(&self, id: Uuid) -> bool {
        self.documents.iter().any(|doc| doc.id == id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut DocumentSummary> {
        self.documents.iter_mut().find(|doc| doc.id == id)
    }

    /// Removes `id`, returning whether it was present.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.documents.len();
        self.documents.retain(|doc| doc.id != id);
        self.documents.len() != before
    }
}

// ---------------------------------------------------------------------------
// Document detail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionActivityView {
    pub id: Uuid,
    pub action_type: RevisionActionType,
    pub created_at: DateTime<Utc>,
    pub actor: ProfileRef,
}

impl RevisionActivityView {
    pub fn from_activity(activity: &RevisionActivity, actor: ProfileRef) -> Self {
        Self {
            id: activity.id,
            action_type: activity.action_type,
            created_at: activity.created_at,
            actor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionView {
    pub id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub status: RevisionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: ProfileRef,
    pub activities: Vector<RevisionActivityView>,
}

impl RevisionView {
    pub fn from_revision(revision: &Revision, author: ProfileRef) -> Self {
        Self {
            id: revision.id,
            document_id: revision.document_id,
            content: revision.content.clone(),
            status: revision.status,
            created_at: revision.created_at,
            updated_at: revision.updated_at,
            author,
            activities: Vector::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDetail {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub author: ProfileRef,
    /// Newest first.
    pub revisions: Vector<RevisionView>,
}

impl DocumentDetail {
    pub fn from_document(document: &Document, author: ProfileRef) -> Self {
        Self {
            id: document.id,
            title: document.title.clone(),
            content: document.content.clone(),
            created_at: document.created_at,
            updated_at: document.updated_at,
            deleted_at: document.deleted_at,
            author,
            revisions: Vector::new(),
        }
    }

    pub fn contains_revision(&self, id: Uuid) -> bool {
        self.revisions.iter().any(|rev| rev.id == id)
    }

    pub fn revision_mut(&mut self, id: Uuid) -> Option<&mut RevisionView> {
        self.revisions.iter_mut().find(|rev| rev.id == id)
    }

    pub fn remove_revision(&mut self, id: Uuid) -> bool {
        let before = self.revisions.len();
        self.revisions.retain(|rev| rev.id != id);
        self.revisions.len() != before
    }

    pub fn pending_revisions(&self) -> u32 {
        let pending = self
            .revisions
            .iter()
            .filter(|rev| rev.status == RevisionStatus::Pending)
            .count();
        u32::try_from(pending).unwrap_or(u32::MAX)
    }
}

// ---------------------------------------------------------------------------
// Activity feed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityView {
    pub id: Uuid,
    pub action_type: DocumentActionType,
    pub created_at: DateTime<Utc>,
    pub document_id: Uuid,
    pub actor: ProfileRef,
    pub document: DocumentRef,
}

impl ActivityView {
    pub fn from_activity(activity: &DocumentActivity, actor: ProfileRef, document: DocumentRef) -> Self {
        Self {
            id: activity.id,
            action_type: activity.action_type,
            created_at: activity.created_at,
            document_id: activity.document_id,
            actor,
            document,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFeed {
    /// Newest first.
    pub activities: Vector<ActivityView>,
    pub next_cursor: Option<Uuid>,
}

impl ActivityFeed {
    pub fn contains(&self, id: Uuid) -> bool {
        self.activities.iter().any(|activity| activity.id == id)
    }

    /// Drops every entry about `document_id`, returning whether any existed.
    pub fn remove_document(&mut self, document_id: Uuid) -> bool {
        let before = self.activities.len();
        self.activities.retain(|activity| activity.document_id != document_id);
        self.activities.len() != before
    }
}
