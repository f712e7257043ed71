mod common;

use async_trait::async_trait;
use colabdoc::actions::{self, DocumentChanges, NewRevision};
use colabdoc::model::{
    Document, DocumentActionType, DocumentActivity, RevisionActionType, RevisionActivity,
    RevisionStatus,
};
use colabdoc::remote::{
    EventKinds, Filter, Query, Row, Subscription, WriteOp, find_by_id, select, to_row,
};
use colabdoc::{ColabError, InMemoryRemoteStore, RemoteStore, Result, Table};
use common::{seed_document, seed_revision, signup};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

async fn document_activity(store: &dyn RemoteStore, document_id: Uuid) -> Vec<DocumentActivity> {
    select::<DocumentActivity>(
        store,
        Query::table(Table::DocumentActivity)
            .filter(Filter::new().eq("documentId", document_id))
            .order_by("createdAt", false),
    )
    .await
    .unwrap()
}

async fn revision_activity(store: &dyn RemoteStore, revision_id: Uuid) -> Vec<RevisionActionType> {
    select::<RevisionActivity>(
        store,
        Query::table(Table::RevisionActivity)
            .filter(Filter::new().eq("revisionId", revision_id))
            .order_by("createdAt", false),
    )
    .await
    .unwrap()
    .into_iter()
    .map(|activity| activity.action_type)
    .collect()
}

#[tokio::test]
async fn test_signup_shares_organization_by_slug() {
    let store = InMemoryRemoteStore::new();
    let alice = signup(&store, "alice@acme.test", "Acme Corp").await;
    let bob = signup(&store, "bob@acme.test", "  acme corp ").await;

    assert_eq!(alice.organization_id, bob.organization_id);
    assert_eq!(store.row_count(Table::Organization).await, 1);
    assert_eq!(store.row_count(Table::Profile).await, 2);
}

#[tokio::test]
async fn test_document_writes_are_audited() {
    let store = InMemoryRemoteStore::new();
    let alice = signup(&store, "alice@acme.test", "Acme").await;
    let document = seed_document(&store, &alice, "Charter").await;

    actions::update_document(
        &store,
        &alice,
        DocumentChanges {
            id: document.id,
            title: "Charter v2".into(),
            content: "Revised body".into(),
        },
    )
    .await
    .unwrap();
    let deleted = actions::delete_document(&store, &alice, document.id).await.unwrap();

    // Soft delete keeps the row.
    assert!(deleted.is_deleted());
    let stored: Document = find_by_id(&store, document.id).await.unwrap().unwrap();
    assert!(stored.deleted_at.is_some());
    assert_eq!(stored.title, "Charter v2");

    let log = document_activity(&store, document.id).await;
    let kinds: Vec<_> = log.iter().map(|activity| activity.action_type).collect();
    assert_eq!(
        kinds,
        vec![
            DocumentActionType::Created,
            DocumentActionType::Updated,
            DocumentActionType::Deleted
        ]
    );
    assert!(log.iter().all(|activity| activity.actor_id == alice.id));
    assert_eq!(log[0].details, json!({"title": "Charter"}));
    assert_eq!(log[1].details, json!({"title": "Charter v2"}));
}

#[tokio::test]
async fn test_deleted_documents_reject_further_writes() {
    let store = InMemoryRemoteStore::new();
    let alice = signup(&store, "alice@acme.test", "Acme").await;
    let document = seed_document(&store, &alice, "Charter").await;
    actions::delete_document(&store, &alice, document.id).await.unwrap();

    let again = actions::delete_document(&store, &alice, document.id).await;
    assert!(matches!(again, Err(ColabError::NotFound { .. })));
    // A failed write leaves no audit row behind.
    assert_eq!(document_activity(&store, document.id).await.len(), 2);
}

#[tokio::test]
async fn test_writes_are_scoped_to_the_actor_organization() {
    let store = InMemoryRemoteStore::new();
    let alice = signup(&store, "alice@acme.test", "Acme").await;
    let eve = signup(&store, "eve@globex.test", "Globex").await;
    let document = seed_document(&store, &alice, "Charter").await;

    let update = actions::update_document(
        &store,
        &eve,
        DocumentChanges {
            id: document.id,
            title: "Hijacked".into(),
            content: String::new(),
        },
    )
    .await;
    assert!(matches!(update, Err(ColabError::NotFound { .. })));

    let revision = actions::create_revision(
        &store,
        &eve,
        NewRevision {
            id: Uuid::new_v4(),
            document_id: document.id,
            content: "Sneaky rewrite".into(),
        },
    )
    .await;
    assert!(matches!(revision, Err(ColabError::NotFound { .. })));

    let own = seed_revision(&store, &alice, document.id).await;
    let accept = actions::accept_revision(&store, &eve, own.id).await;
    assert!(matches!(accept, Err(ColabError::NotFound { .. })));

    assert_eq!(document_activity(&store, document.id).await.len(), 1);
    let stored: Document = find_by_id(&store, document.id).await.unwrap().unwrap();
    assert_eq!(stored.title, "Charter");
}

#[tokio::test]
async fn test_revisions_settle_once() {
    let store = InMemoryRemoteStore::new();
    let alice = signup(&store, "alice@acme.test", "Acme").await;
    let document = seed_document(&store, &alice, "Charter").await;
    let revision = seed_revision(&store, &alice, document.id).await;
    assert_eq!(revision.status, RevisionStatus::Pending);

    let accepted = actions::accept_revision(&store, &alice, revision.id).await.unwrap();
    assert_eq!(accepted.status, RevisionStatus::Accepted);

    let rejected = actions::reject_revision(&store, &alice, revision.id).await;
    assert!(matches!(rejected, Err(ColabError::InvalidTransition(_))));
    assert_eq!(
        revision_activity(&store, revision.id).await,
        vec![RevisionActionType::Created, RevisionActionType::Accepted]
    );
}

#[tokio::test]
async fn test_short_revision_content_is_rejected() {
    let store = InMemoryRemoteStore::new();
    let alice = signup(&store, "alice@acme.test", "Acme").await;
    let document = seed_document(&store, &alice, "Charter").await;

    let result = actions::create_revision(
        &store,
        &alice,
        NewRevision {
            id: Uuid::new_v4(),
            document_id: document.id,
            content: "tweak".into(),
        },
    )
    .await;
    assert!(matches!(result, Err(ColabError::Validation(_))));
    assert_eq!(store.row_count(Table::Revision).await, 0);
}

/// Settles the revision behind the caller's back right before its first
/// write lands.
struct RacingStore {
    inner: Arc<InMemoryRemoteStore>,
    revision: Uuid,
    raced: AtomicBool,
}

#[async_trait]
impl RemoteStore for RacingStore {
    async fn query(&self, query: Query) -> Result<Vec<Row>> {
        self.inner.query(query).await
    }

    async fn batch(&self, ops: Vec<WriteOp>) -> Result<Vec<Row>> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let patch = to_row(&json!({"status": RevisionStatus::Rejected})).unwrap();
            self.inner
                .update(Table::Revision, Filter::by_id(self.revision), patch)
                .await
                .unwrap();
        }
        self.inner.batch(ops).await
    }

    async fn subscribe(&self, table: Table, filter: Filter, kinds: EventKinds) -> Result<Subscription> {
        self.inner.subscribe(table, filter, kinds).await
    }
}

#[tokio::test]
async fn test_concurrent_settlement_is_a_conflict() {
    let inner = Arc::new(InMemoryRemoteStore::new());
    let alice = signup(inner.as_ref(), "alice@acme.test", "Acme").await;
    let document = seed_document(inner.as_ref(), &alice, "Charter").await;
    let revision = seed_revision(inner.as_ref(), &alice, document.id).await;
    let racing = RacingStore {
        inner: Arc::clone(&inner),
        revision: revision.id,
        raced: AtomicBool::new(false),
    };

    let result = actions::accept_revision(&racing, &alice, revision.id).await;
    assert!(matches!(result, Err(ColabError::Conflict(_))));
    assert_eq!(
        revision_activity(inner.as_ref(), revision.id).await,
        vec![RevisionActionType::Created]
    );
}
