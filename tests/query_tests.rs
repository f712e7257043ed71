mod common;

use colabdoc::actions;
use colabdoc::model::{DocumentActionType, Profile, RevisionActionType, RevisionStatus};
use colabdoc::remote::to_row;
use colabdoc::{ChangeEvent, InMemoryRemoteStore, QueryKey, ReconcileScope, RemoteStore, Session, Table};
use common::{FlakyStore, open_session, seed_document, seed_revision, signup};
use std::sync::Arc;
use uuid::Uuid;

async fn setup() -> (Arc<FlakyStore>, Profile, Session) {
    let inner = Arc::new(InMemoryRemoteStore::new());
    let alice = signup(inner.as_ref(), "alice@acme.test", "Acme").await;
    let flaky = Arc::new(FlakyStore::new(inner));
    let remote: Arc<dyn RemoteStore> = flaky.clone();
    let session = open_session(remote, &alice).await;
    (flaky, alice, session)
}

#[tokio::test]
async fn test_fresh_entries_skip_the_store() {
    let (flaky, alice, session) = setup().await;
    seed_document(flaky.inner().as_ref(), &alice, "Charter").await;
    let queries = session.queries().unwrap();

    let first = queries.documents(10).await.unwrap();
    assert!(first.is_success());
    let reads = flaky.query_count();

    let second = queries.documents(10).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(flaky.query_count(), reads);
}

#[tokio::test]
async fn test_invalidated_entries_refetch() {
    let (flaky, alice, session) = setup().await;
    let queries = session.queries().unwrap();
    assert!(queries.documents(10).await.unwrap().data.unwrap().documents.is_empty());

    seed_document(flaky.inner().as_ref(), &alice, "Charter").await;
    let key = QueryKey::documents(alice.organization_id, 10);
    assert!(session.cache().invalidate(&key).unwrap());

    let refreshed = queries.documents(10).await.unwrap();
    assert_eq!(refreshed.data.unwrap().documents.len(), 1);
    assert!(!session.cache().is_stale(&key).unwrap());
}

#[tokio::test]
async fn test_failed_refetch_keeps_previous_data() {
    let (flaky, alice, session) = setup().await;
    seed_document(flaky.inner().as_ref(), &alice, "Charter").await;
    let queries = session.queries().unwrap();
    let loaded = queries.documents(10).await.unwrap().data;

    session
        .cache()
        .invalidate(&QueryKey::documents(alice.organization_id, 10))
        .unwrap();
    flaky.fail_reads(true);
    let state = queries.documents(10).await.unwrap();

    assert_eq!(state.data, loaded);
    assert!(!state.is_pending);
    assert!(state.error.unwrap().contains("connection reset"));
}

#[tokio::test]
async fn test_failed_first_fetch_reports_error() {
    let (flaky, _alice, session) = setup().await;
    flaky.fail_reads(true);

    let state = session.queries().unwrap().documents(10).await.unwrap();
    assert!(state.data.is_none());
    assert!(state.error.is_some());
    assert!(!state.is_success());
}

#[tokio::test]
async fn test_load_more_appends_without_duplicates() {
    let (flaky, alice, session) = setup().await;
    let mut ids = Vec::new();
    for title in ["Oldest", "Middle", "Newest"] {
        ids.push(seed_document(flaky.inner().as_ref(), &alice, title).await);
    }
    let queries = session.queries().unwrap();
    let first = queries.documents(2).await.unwrap().data.unwrap();
    assert_eq!(first.documents.len(), 2);
    assert_eq!(first.next_cursor, Some(ids[1].id));

    // The oldest document reaches the window through the change feed first.
    session
        .reconciler()
        .apply(
            ReconcileScope::Organization(alice.organization_id),
            ChangeEvent::Insert {
                table: Table::Document,
                new: to_row(&ids[0]).unwrap(),
            },
        )
        .await
        .unwrap();

    let merged = queries.load_more_documents(2).await.unwrap().data.unwrap();
    assert_eq!(merged.documents.len(), 3);
    assert_eq!(merged.documents.iter().filter(|doc| doc.id == ids[0].id).count(), 1);
    assert_eq!(merged.next_cursor, None);

    // Nothing further to load.
    let reads = flaky.query_count();
    let again = queries.load_more_documents(2).await.unwrap().data.unwrap();
    assert_eq!(again, merged);
    assert_eq!(flaky.query_count(), reads);
}

#[tokio::test]
async fn test_refetch_keeps_loaded_pages() {
    let (flaky, alice, session) = setup().await;
    for title in ["Oldest", "Older", "Middle", "Newer", "Newest"] {
        seed_document(flaky.inner().as_ref(), &alice, title).await;
    }
    let queries = session.queries().unwrap();
    queries.documents(2).await.unwrap();
    let loaded = queries.load_more_documents(2).await.unwrap().data.unwrap();
    assert_eq!(loaded.documents.len(), 4);

    session
        .cache()
        .invalidate(&QueryKey::documents(alice.organization_id, 2))
        .unwrap();
    let reads = flaky.query_count();
    let refreshed = queries.documents(2).await.unwrap().data.unwrap();

    assert!(flaky.query_count() > reads);
    assert_eq!(refreshed, loaded);
    let last = queries.load_more_documents(2).await.unwrap().data.unwrap();
    assert_eq!(last.documents.len(), 5);
    assert_eq!(last.next_cursor, None);
}

#[tokio::test]
async fn test_documents_count_skips_deleted_and_foreign() {
    let (flaky, alice, session) = setup().await;
    let store = flaky.inner().as_ref();
    let eve = signup(store, "eve@globex.test", "Globex").await;
    seed_document(store, &alice, "Charter").await;
    let notes = seed_document(store, &alice, "Notes").await;
    seed_document(store, &eve, "Secret").await;
    assert_eq!(session.queries().unwrap().documents_count().await.unwrap(), 2);

    actions::delete_document(store, &alice, notes.id).await.unwrap();
    assert_eq!(session.queries().unwrap().documents_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_document_detail_shape() {
    let (flaky, alice, session) = setup().await;
    let store = flaky.inner().as_ref();
    let bob = signup(store, "bob@acme.test", "Acme").await;
    let document = seed_document(store, &alice, "Charter").await;
    let older = seed_revision(store, &bob, document.id).await;
    actions::accept_revision(store, &alice, older.id).await.unwrap();
    let newer = seed_revision(store, &bob, document.id).await;

    let detail = session.queries().unwrap().document(document.id).await.unwrap().data.unwrap();
    assert_eq!(detail.author.email, "alice@acme.test");
    assert_eq!(detail.revisions[0].id, newer.id);
    assert_eq!(detail.revisions[1].id, older.id);
    assert_eq!(detail.revisions[1].status, RevisionStatus::Accepted);
    assert_eq!(detail.revisions[0].author.email, "bob@acme.test");

    let history: Vec<_> = detail.revisions[1].activities.iter().map(|a| a.action_type).collect();
    assert_eq!(history, vec![RevisionActionType::Created, RevisionActionType::Accepted]);
    assert_eq!(detail.revisions[1].activities[1].actor.email, "alice@acme.test");
    assert_eq!(detail.pending_revisions(), 1);

    let list = session.queries().unwrap().documents(10).await.unwrap().data.unwrap();
    assert_eq!(list.documents[0].counts.pending_revisions, 1);
}

#[tokio::test]
async fn test_feeds_and_timeline() {
    let (flaky, alice, session) = setup().await;
    let store = flaky.inner().as_ref();
    let charter = seed_document(store, &alice, "Charter").await;
    let notes = seed_document(store, &alice, "Notes").await;
    actions::delete_document(store, &alice, notes.id).await.unwrap();

    let queries = session.queries().unwrap();
    let feed = queries.organization_activity(10).await.unwrap().data.unwrap();
    let kinds: Vec<_> = feed.activities.iter().map(|a| a.action_type).collect();
    assert_eq!(
        kinds,
        vec![
            DocumentActionType::Deleted,
            DocumentActionType::Created,
            DocumentActionType::Created
        ]
    );
    assert_eq!(feed.activities[0].document.title, "Notes");
    assert_eq!(feed.activities[0].actor.email, "alice@acme.test");

    let timeline = queries.document_timeline(charter.id).await.unwrap().data.unwrap();
    assert_eq!(timeline.activities.len(), 1);
    assert_eq!(timeline.activities[0].document_id, charter.id);

    // Soft-deleted documents leave the list.
    let list = queries.documents(10).await.unwrap().data.unwrap();
    assert_eq!(list.documents.len(), 1);
    assert_eq!(list.documents[0].id, charter.id);
}

#[tokio::test]
async fn test_foreign_documents_are_not_found() {
    let (flaky, _alice, session) = setup().await;
    let eve = signup(flaky.inner().as_ref(), "eve@globex.test", "Globex").await;
    let secret = seed_document(flaky.inner().as_ref(), &eve, "Secret").await;

    let state = session.queries().unwrap().document(secret.id).await.unwrap();
    assert!(state.data.is_none());
    assert!(state.error.unwrap().contains("not found"));

    let missing = session.queries().unwrap().profile(Uuid::new_v4()).await.unwrap();
    assert!(missing.data.is_none());
}

#[tokio::test]
async fn test_profile_query() {
    let (_flaky, alice, session) = setup().await;
    let state = session.queries().unwrap().profile(alice.id).await.unwrap();
    assert_eq!(state.data, Some(alice));
}
