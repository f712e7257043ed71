//! Structural cache patches shared by optimistic mutations and realtime
//! reconciliation.
//!
//! Every patch merges into the existing view: it touches only the fields it
//! carries and leaves nested sub-objects (author, counts, activities) alone.
//! Inserts skip ids already present, so replaying a patch is a no-op.

use crate::cache::{CachePatch, KeyPrefix};
use crate::core::Result;
use crate::model::{
    ActivityView, DocumentDetail, DocumentSummary, RevisionStatus, RevisionView,
};
use crate::remote::Row;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// Document columns a change may carry. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFields {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DocumentFields {
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(row.clone()))?)
    }

    pub fn is_soft_delete(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn apply_to_summary(&self, summary: &mut DocumentSummary) {
        if let Some(title) = &self.title {
            summary.title.clone_from(title);
        }
        if let Some(content) = &self.content {
            summary.content.clone_from(content);
        }
        if let Some(updated_at) = self.updated_at {
            summary.updated_at = updated_at;
        }
    }

    pub fn apply_to_detail(&self, detail: &mut DocumentDetail) {
        if let Some(title) = &self.title {
            detail.title.clone_from(title);
        }
        if let Some(content) = &self.content {
            detail.content.clone_from(content);
        }
        if let Some(updated_at) = self.updated_at {
            detail.updated_at = updated_at;
        }
        if let Some(deleted_at) = self.deleted_at {
            detail.deleted_at = Some(deleted_at);
        }
    }
}

/// Revision columns a change may carry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionFields {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub status: Option<RevisionStatus>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RevisionFields {
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(row.clone()))?)
    }

    pub fn apply_to(&self, view: &mut RevisionView) {
        if let Some(content) = &self.content {
            view.content.clone_from(content);
        }
        if let Some(status) = self.status {
            view.status = status;
        }
        if let Some(updated_at) = self.updated_at {
            view.updated_at = updated_at;
        }
    }
}

fn documents_scope(organization_id: Option<Uuid>) -> KeyPrefix {
    match organization_id {
        Some(organization_id) => KeyPrefix::documents_of(organization_id),
        None => KeyPrefix::collection(crate::cache::Collection::Documents),
    }
}

// ---------------------------------------------------------------------------
// Document lists
// ---------------------------------------------------------------------------

/// Prepends `summary` to every window of the organization's list.
pub fn prepend_document(organization_id: Uuid, summary: DocumentSummary) -> CachePatch {
    CachePatch::new(KeyPrefix::documents_of(organization_id), move |_, value| {
        if let Some(page) = value.as_documents_page_mut() {
            if !page.contains(summary.id) {
                page.documents.push_front(summary.clone());
            }
        }
    })
}

/// Merges `fields` into the document wherever a list window holds it.
pub fn patch_document_lists(
    organization_id: Option<Uuid>,
    document_id: Uuid,
    fields: DocumentFields,
) -> CachePatch {
    CachePatch::new(documents_scope(organization_id), move |_, value| {
        if let Some(summary) = value
            .as_documents_page_mut()
            .and_then(|page| page.get_mut(document_id))
        {
            fields.apply_to_summary(summary);
        }
    })
}

/// Drops the document from every list window.
pub fn remove_document_from_lists(organization_id: Option<Uuid>, document_id: Uuid) -> CachePatch {
    CachePatch::new(documents_scope(organization_id), move |_, value| {
        if let Some(page) = value.as_documents_page_mut() {
            page.remove(document_id);
        }
    })
}

/// Shifts the pending revision count shown in list windows, never below 0.
pub fn adjust_pending_count(organization_id: Uuid, document_id: Uuid, delta: i64) -> CachePatch {
    CachePatch::new(KeyPrefix::documents_of(organization_id), move |_, value| {
        if let Some(summary) = value
            .as_documents_page_mut()
            .and_then(|page| page.get_mut(document_id))
        {
            let next = i64::from(summary.counts.pending_revisions) + delta;
            summary.counts.pending_revisions = u32::try_from(next.max(0)).unwrap_or(u32::MAX);
        }
    })
}

// ---------------------------------------------------------------------------
// Document detail
// ---------------------------------------------------------------------------

pub fn patch_document_detail(document_id: Uuid, fields: DocumentFields) -> CachePatch {
    CachePatch::new(KeyPrefix::document(document_id), move |_, value| {
        if let Some(detail) = value.as_document_detail_mut() {
            fields.apply_to_detail(detail);
        }
    })
}

pub fn prepend_revision(document_id: Uuid, revision: RevisionView) -> CachePatch {
    CachePatch::new(KeyPrefix::document(document_id), move |_, value| {
        if let Some(detail) = value.as_document_detail_mut() {
            if !detail.contains_revision(revision.id) {
                detail.revisions.push_front(revision.clone());
            }
        }
    })
}

pub fn patch_revision(document_id: Uuid, revision_id: Uuid, fields: RevisionFields) -> CachePatch {
    CachePatch::new(KeyPrefix::document(document_id), move |_, value| {
        if let Some(revision) = value
            .as_document_detail_mut()
            .and_then(|detail| detail.revision_mut(revision_id))
        {
            fields.apply_to(revision);
        }
    })
}

pub fn remove_revision(document_id: Uuid, revision_id: Uuid) -> CachePatch {
    CachePatch::new(KeyPrefix::document(document_id), move |_, value| {
        if let Some(detail) = value.as_document_detail_mut() {
            detail.remove_revision(revision_id);
        }
    })
}

// ---------------------------------------------------------------------------
// Activity feeds
// ---------------------------------------------------------------------------

/// Prepends to the organization feed windows and the document's timeline.
pub fn prepend_activity(organization_id: Uuid, activity: ActivityView) -> Vec<CachePatch> {
    let timeline = activity.clone();
    vec![
        CachePatch::new(KeyPrefix::activities_of(organization_id), move |_, value| {
            if let Some(feed) = value.as_activity_feed_mut() {
                if !feed.contains(activity.id) {
                    feed.activities.push_front(activity.clone());
                }
            }
        }),
        CachePatch::new(KeyPrefix::timeline_of(timeline.document_id), move |_, value| {
            if let Some(feed) = value.as_activity_feed_mut() {
                if !feed.contains(timeline.id) {
                    feed.activities.push_front(timeline.clone());
                }
            }
        }),
    ]
}
