use crate::cache::{CachePatch, CachedValue, ClientCache, Collection, KeyPrefix, QueryKey};
use crate::core::Result;
use crate::model::{
    ActivityView, Document, DocumentActivity, DocumentSummary, Revision, RevisionView,
};
use crate::mutation::patches::{self, DocumentFields, RevisionFields};
use crate::queries::{document_ref, profile_ref};
use crate::remote::{ChangeEvent, RemoteStore, Row, Table, from_row, row_id};
use futures::future::join;
use std::sync::Arc;
use tracing::{Level, event};
use uuid::Uuid;

/// Which slice of server state a subscription mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileScope {
    /// Document changes and activity inserts of one organization.
    Organization(Uuid),
    /// One document, its revisions and its activity inserts.
    Document(Uuid),
}

impl std::fmt::Display for ReconcileScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileScope::Organization(id) => write!(f, "org-{}", id),
            ReconcileScope::Document(id) => write!(f, "document-{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The event changed these cache entries.
    Applied { entries: Vec<QueryKey> },
    /// Every cached collection already reflects the event.
    Duplicate,
    /// Nothing cached refers to the record, or the event is outside the scope.
    Dropped,
}

impl ReconcileOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ReconcileOutcome::Applied { .. })
    }
}

/// How many live entries under some prefixes exist, and how many of them
/// already hold a given record.
struct Coverage {
    live: usize,
    holding: usize,
}

/// Merges change events into the client cache.
///
/// Independent of any mutation in flight: an echo of a local optimistic
/// change finds the cache already equal and is reported as a duplicate.
#[derive(Clone)]
pub struct RealtimeReconciler {
    cache: ClientCache,
    store: Arc<dyn RemoteStore>,
}

impl RealtimeReconciler {
    pub fn new(cache: ClientCache, store: Arc<dyn RemoteStore>) -> Self {
        Self { cache, store }
    }

    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }

    pub(crate) fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub async fn apply(&self, scope: ReconcileScope, change: ChangeEvent) -> Result<ReconcileOutcome> {
        let table = change.table();
        let kind = change.kind();
        let record = change.record_id();
        let outcome = match (scope, change) {
            (ReconcileScope::Organization(org), ChangeEvent::Insert { table: Table::Document, new }) => {
                self.document_inserted(org, new).await?
            }
            (_, ChangeEvent::Update { table: Table::Document, new, .. }) => {
                self.document_updated(scope, new)?
            }
            (_, ChangeEvent::Delete { table: Table::Document, old }) => self.document_deleted(scope, &old)?,
            (_, ChangeEvent::Insert { table: Table::DocumentActivity, new }) => {
                self.activity_inserted(scope, new).await?
            }
            (ReconcileScope::Document(doc), ChangeEvent::Insert { table: Table::Revision, new }) => {
                self.revision_inserted(doc, new).await?
            }
            (ReconcileScope::Document(doc), ChangeEvent::Update { table: Table::Revision, new, .. }) => {
                self.revision_updated(doc, &new)?
            }
            (ReconcileScope::Document(doc), ChangeEvent::Delete { table: Table::Revision, old }) => {
                self.revision_deleted(doc, &old)?
            }
            _ => ReconcileOutcome::Dropped,
        };
        event!(
            Level::DEBUG,
            scope = %scope,
            table = %table,
            kind = %kind,
            record = ?record,
            outcome = ?outcome,
            "change reconciled"
        );
        Ok(outcome)
    }

    fn coverage<F>(&self, prefixes: &[KeyPrefix], holds: F) -> Result<Coverage>
    where
        F: Fn(&CachedValue) -> bool,
    {
        let snapshot = self
            .cache
            .snapshot(|key| prefixes.iter().any(|prefix| prefix.matches(key)))?;
        let mut coverage = Coverage { live: 0, holding: 0 };
        for key in snapshot.keys() {
            if let Some(value) = snapshot.get(key) {
                coverage.live += 1;
                if holds(value) {
                    coverage.holding += 1;
                }
            }
        }
        Ok(coverage)
    }

    fn settle(&self, patches: &[CachePatch], present: bool) -> Result<ReconcileOutcome> {
        let applied = self.cache.apply_patches(patches)?;
        let entries: Vec<QueryKey> = applied.touched().cloned().collect();
        Ok(if !entries.is_empty() {
            ReconcileOutcome::Applied { entries }
        } else if present {
            ReconcileOutcome::Duplicate
        } else {
            ReconcileOutcome::Dropped
        })
    }

    fn holds_document(value: &CachedValue, id: Uuid) -> bool {
        match value {
            CachedValue::DocumentsPage(page) => page.contains(id),
            CachedValue::DocumentDetail(detail) => detail.id == id,
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    async fn document_inserted(&self, org: Uuid, new: Row) -> Result<ReconcileOutcome> {
        let Some(document) = decode::<Document>(new) else {
            return Ok(ReconcileOutcome::Dropped);
        };
        if document.organization_id != org || document.is_deleted() {
            return Ok(ReconcileOutcome::Dropped);
        }
        let prefixes = [KeyPrefix::documents_of(org)];
        let coverage = self.coverage(&prefixes, |value| Self::holds_document(value, document.id))?;
        if coverage.live == 0 {
            return Ok(ReconcileOutcome::Dropped);
        }
        if coverage.holding == coverage.live {
            return Ok(ReconcileOutcome::Duplicate);
        }

        let author = profile_ref(self.store.as_ref(), document.author_id).await;
        let summary = DocumentSummary::from_document(&document, author, 0);
        self.settle(&[patches::prepend_document(org, summary)], true)
    }

    fn document_updated(&self, scope: ReconcileScope, new: Row) -> Result<ReconcileOutcome> {
        let Some(id) = row_id(&new) else {
            return Ok(ReconcileOutcome::Dropped);
        };
        let fields = match DocumentFields::from_row(&new) {
            Ok(fields) => fields,
            Err(err) => {
                event!(Level::WARN, document = %id, error = %err, "undecodable document update");
                return Ok(ReconcileOutcome::Dropped);
            }
        };
        let org = match scope {
            ReconcileScope::Organization(org) => Some(org),
            ReconcileScope::Document(doc) if doc != id => return Ok(ReconcileOutcome::Dropped),
            ReconcileScope::Document(_) => organization_of(&new),
        };

        let lists = match org {
            Some(org) => KeyPrefix::documents_of(org),
            None => KeyPrefix::collection(Collection::Documents),
        };
        let present = self
            .coverage(&[lists, KeyPrefix::document(id)], |value| Self::holds_document(value, id))?
            .holding
            > 0;

        let list_patch = if fields.is_soft_delete() {
            patches::remove_document_from_lists(org, id)
        } else {
            patches::patch_document_lists(org, id, fields.clone())
        };
        self.settle(&[list_patch, patches::patch_document_detail(id, fields)], present)
    }

    fn document_deleted(&self, scope: ReconcileScope, old: &Row) -> Result<ReconcileOutcome> {
        let Some(id) = row_id(old) else {
            return Ok(ReconcileOutcome::Dropped);
        };
        if matches!(scope, ReconcileScope::Document(doc) if doc != id) {
            return Ok(ReconcileOutcome::Dropped);
        }

        // Delete payloads may carry only the primary key: sweep every list.
        let feeds = CachePatch::new(
            KeyPrefix::collection(Collection::DocumentActivities),
            move |_, value| {
                if let Some(feed) = value.as_activity_feed_mut() {
                    feed.remove_document(id);
                }
            },
        );
        let applied = self
            .cache
            .apply_patches(&[patches::remove_document_from_lists(None, id), feeds])?;
        let mut entries: Vec<QueryKey> = applied.touched().cloned().collect();
        for key in [QueryKey::document(id), QueryKey::document_timeline(id)] {
            if self.cache.remove(&key)?.is_some() {
                entries.push(key);
            }
        }
        Ok(if entries.is_empty() {
            ReconcileOutcome::Dropped
        } else {
            ReconcileOutcome::Applied { entries }
        })
    }

    // ------------------------------------------------------------------
    // Revisions
    // ------------------------------------------------------------------

    async fn revision_inserted(&self, document_id: Uuid, new: Row) -> Result<ReconcileOutcome> {
        let Some(revision) = decode::<Revision>(new) else {
            return Ok(ReconcileOutcome::Dropped);
        };
        if revision.document_id != document_id {
            return Ok(ReconcileOutcome::Dropped);
        }
        let coverage = self.coverage(&[KeyPrefix::document(document_id)], |value| match value {
            CachedValue::DocumentDetail(detail) => detail.contains_revision(revision.id),
            _ => false,
        })?;
        if coverage.live == 0 {
            return Ok(ReconcileOutcome::Dropped);
        }
        if coverage.holding == coverage.live {
            return Ok(ReconcileOutcome::Duplicate);
        }

        let author = profile_ref(self.store.as_ref(), revision.author_id).await;
        let view = RevisionView::from_revision(&revision, author);
        self.settle(&[patches::prepend_revision(document_id, view)], true)
    }

    fn revision_updated(&self, document_id: Uuid, new: &Row) -> Result<ReconcileOutcome> {
        let Some(id) = row_id(new) else {
            return Ok(ReconcileOutcome::Dropped);
        };
        let fields = match RevisionFields::from_row(new) {
            Ok(fields) => fields,
            Err(err) => {
                event!(Level::WARN, revision = %id, error = %err, "undecodable revision update");
                return Ok(ReconcileOutcome::Dropped);
            }
        };
        let present = self
            .coverage(&[KeyPrefix::document(document_id)], |value| match value {
                CachedValue::DocumentDetail(detail) => detail.contains_revision(id),
                _ => false,
            })?
            .holding
            > 0;
        self.settle(&[patches::patch_revision(document_id, id, fields)], present)
    }

    fn revision_deleted(&self, document_id: Uuid, old: &Row) -> Result<ReconcileOutcome> {
        let Some(id) = row_id(old) else {
            return Ok(ReconcileOutcome::Dropped);
        };
        self.settle(&[patches::remove_revision(document_id, id)], false)
    }

    // ------------------------------------------------------------------
    // Activity
    // ------------------------------------------------------------------

    async fn activity_inserted(&self, scope: ReconcileScope, new: Row) -> Result<ReconcileOutcome> {
        let Some(activity) = decode::<DocumentActivity>(new) else {
            return Ok(ReconcileOutcome::Dropped);
        };
        let in_scope = match scope {
            ReconcileScope::Organization(org) => activity.organization_id == org,
            ReconcileScope::Document(doc) => activity.document_id == doc,
        };
        if !in_scope {
            return Ok(ReconcileOutcome::Dropped);
        }
        let prefixes = [
            KeyPrefix::activities_of(activity.organization_id),
            KeyPrefix::timeline_of(activity.document_id),
        ];
        let coverage = self.coverage(&prefixes, |value| match value {
            CachedValue::ActivityFeed(feed) => feed.contains(activity.id),
            _ => false,
        })?;
        if coverage.live == 0 {
            return Ok(ReconcileOutcome::Dropped);
        }
        if coverage.holding == coverage.live {
            return Ok(ReconcileOutcome::Duplicate);
        }

        let (actor, document) = join(
            profile_ref(self.store.as_ref(), activity.actor_id),
            document_ref(self.store.as_ref(), activity.document_id),
        )
        .await;
        let view = ActivityView::from_activity(&activity, actor, document);
        self.settle(&patches::prepend_activity(activity.organization_id, view), true)
    }
}

impl std::fmt::Debug for RealtimeReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeReconciler").finish_non_exhaustive()
    }
}

fn decode<T: serde::de::DeserializeOwned>(row: Row) -> Option<T> {
    match from_row::<T>(row) {
        Ok(record) => Some(record),
        Err(err) => {
            event!(Level::WARN, error = %err, "undecodable change payload");
            None
        }
    }
}

fn organization_of(row: &Row) -> Option<Uuid> {
    row.get("organizationId")
        .and_then(|value| value.as_str())
        .and_then(|raw| Uuid::parse_str(raw).ok())
}
