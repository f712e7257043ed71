//! Read queries producing the cached view shapes.

use super::lookup::{document_refs, profile_refs, resolved_document, resolved_profile};
use crate::core::{ColabError, Result};
use crate::model::{
    ActivityFeed, ActivityView, Document, DocumentActivity, DocumentDetail, DocumentSummary,
    DocumentsPage, Profile, Revision, RevisionActivity, RevisionActivityView, RevisionStatus,
    RevisionView,
};
use crate::remote::{Filter, Query, RemoteStore, Table, find_one, get_by_id, select};
use futures::future::{join, try_join_all};
use std::iter;
use uuid::Uuid;

/// A full page means there may be more; its last id is the next cursor.
fn next_cursor<T>(rows: &[T], limit: usize, id: impl Fn(&T) -> Uuid) -> Option<Uuid> {
    if limit > 0 && rows.len() == limit {
        rows.last().map(id)
    } else {
        None
    }
}

pub async fn pending_revisions(store: &dyn RemoteStore, document_id: Uuid) -> Result<u32> {
    let query = Query::table(Table::Revision).filter(
        Filter::new()
            .eq("documentId", document_id)
            .eq("status", RevisionStatus::Pending),
    );
    let rows = store.query(query).await?;
    Ok(u32::try_from(rows.len()).unwrap_or(u32::MAX))
}

pub async fn count_documents(store: &dyn RemoteStore, organization_id: Uuid) -> Result<usize> {
    let query = Query::table(Table::Document).filter(
        Filter::new()
            .eq("organizationId", organization_id)
            .is_null("deletedAt"),
    );
    Ok(store.query(query).await?.len())
}

/// Live documents of an organization, most recently updated first.
pub async fn fetch_documents_page(
    store: &dyn RemoteStore,
    organization_id: Uuid,
    limit: usize,
    cursor: Option<Uuid>,
) -> Result<DocumentsPage> {
    let query = Query::table(Table::Document)
        .filter(
            Filter::new()
                .eq("organizationId", organization_id)
                .is_null("deletedAt"),
        )
        .order_desc("updatedAt")
        .limit(limit)
        .after(cursor);
    let documents = select::<Document>(store, query).await?;

    let (authors, counts) = join(
        profile_refs(store, documents.iter().map(|doc| doc.author_id)),
        try_join_all(documents.iter().map(|doc| pending_revisions(store, doc.id))),
    )
    .await;
    let counts = counts?;

    Ok(DocumentsPage {
        next_cursor: next_cursor(&documents, limit, |doc| doc.id),
        documents: documents
            .iter()
            .zip(counts)
            .map(|(doc, pending)| {
                DocumentSummary::from_document(doc, resolved_profile(&authors, doc.author_id), pending)
            })
            .collect(),
    })
}

/// One document of the organization with every revision, newest first, and
/// each revision's activity in chronological order.
pub async fn fetch_document_detail(
    store: &dyn RemoteStore,
    organization_id: Uuid,
    document_id: Uuid,
) -> Result<DocumentDetail> {
    let document = find_one::<Document>(
        store,
        Filter::by_id(document_id).eq("organizationId", organization_id),
    )
    .await?
    .ok_or_else(|| ColabError::not_found("Document", document_id))?;

    let revisions = select::<Revision>(
        store,
        Query::table(Table::Revision)
            .filter(Filter::new().eq("documentId", document_id))
            .order_desc("createdAt"),
    )
    .await?;
    let activities = try_join_all(revisions.iter().map(|revision| {
        select::<RevisionActivity>(
            store,
            Query::table(Table::RevisionActivity)
                .filter(Filter::new().eq("revisionId", revision.id))
                .order_by("createdAt", false),
        )
    }))
    .await?;

    let people = profile_refs(
        store,
        iter::once(document.author_id)
            .chain(revisions.iter().map(|revision| revision.author_id))
            .chain(activities.iter().flatten().map(|activity| activity.actor_id)),
    )
    .await;

    let mut detail = DocumentDetail::from_document(&document, resolved_profile(&people, document.author_id));
    detail.revisions = revisions
        .iter()
        .zip(activities)
        .map(|(revision, activities)| {
            let mut view = RevisionView::from_revision(revision, resolved_profile(&people, revision.author_id));
            view.activities = activities
                .iter()
                .map(|activity| {
                    RevisionActivityView::from_activity(activity, resolved_profile(&people, activity.actor_id))
                })
                .collect();
            view
        })
        .collect();
    Ok(detail)
}

async fn activity_feed(store: &dyn RemoteStore, query: Query) -> Result<ActivityFeed> {
    let limit = query.limit;
    let activities = select::<DocumentActivity>(store, query).await?;
    let (actors, documents) = join(
        profile_refs(store, activities.iter().map(|activity| activity.actor_id)),
        document_refs(store, activities.iter().map(|activity| activity.document_id)),
    )
    .await;

    Ok(ActivityFeed {
        next_cursor: limit.and_then(|limit| next_cursor(&activities, limit, |activity| activity.id)),
        activities: activities
            .iter()
            .map(|activity| {
                ActivityView::from_activity(
                    activity,
                    resolved_profile(&actors, activity.actor_id),
                    resolved_document(&documents, activity.document_id),
                )
            })
            .collect(),
    })
}

/// Organization activity feed, newest first.
pub async fn fetch_activity_feed(
    store: &dyn RemoteStore,
    organization_id: Uuid,
    limit: usize,
    cursor: Option<Uuid>,
) -> Result<ActivityFeed> {
    let query = Query::table(Table::DocumentActivity)
        .filter(Filter::new().eq("organizationId", organization_id))
        .order_desc("createdAt")
        .limit(limit)
        .after(cursor);
    activity_feed(store, query).await
}

/// Every activity row of one document, newest first.
pub async fn fetch_document_timeline(
    store: &dyn RemoteStore,
    organization_id: Uuid,
    document_id: Uuid,
) -> Result<ActivityFeed> {
    let query = Query::table(Table::DocumentActivity)
        .filter(
            Filter::new()
                .eq("organizationId", organization_id)
                .eq("documentId", document_id),
        )
        .order_desc("createdAt");
    activity_feed(store, query).await
}

pub async fn fetch_profile(store: &dyn RemoteStore, user_id: Uuid) -> Result<Profile> {
    get_by_id::<Profile>(store, user_id).await
}
