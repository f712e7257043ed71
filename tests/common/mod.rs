#![allow(dead_code)]

use async_trait::async_trait;
use colabdoc::actions::{self, NewDocument, NewRevision, SignupRequest};
use colabdoc::model::{Document, Profile, Revision};
use colabdoc::remote::{EventKinds, Filter, Query, Row, Subscription, WriteOp};
use colabdoc::{ClientConfig, ColabError, InMemoryRemoteStore, RemoteStore, Result, Session, Table};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Wraps the in-memory store with switchable failures and per-batch delays.
pub struct FlakyStore {
    inner: Arc<InMemoryRemoteStore>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    fail_next: AtomicUsize,
    batches: AtomicUsize,
    queries: AtomicUsize,
    delays: Mutex<VecDeque<Duration>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryRemoteStore>) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_next: AtomicUsize::new(0),
            batches: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            delays: Mutex::new(VecDeque::new()),
        }
    }

    pub fn inner(&self) -> &Arc<InMemoryRemoteStore> {
        &self.inner
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Fails the next `count` batches, counted from when they are issued.
    pub fn fail_next_batches(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Delays the next batches by the given durations, in order.
    pub fn delay_batches(&self, delays: &[Duration]) {
        self.delays.lock().unwrap().extend(delays.iter().copied());
    }

    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for FlakyStore {
    async fn query(&self, query: Query) -> Result<Vec<Row>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ColabError::Remote("connection reset".into()));
        }
        self.inner.query(query).await
    }

    async fn batch(&self, ops: Vec<WriteOp>) -> Result<Vec<Row>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        let fail_this = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail_this || self.fail_writes.load(Ordering::SeqCst) {
            return Err(ColabError::Remote("service unavailable".into()));
        }
        self.inner.batch(ops).await
    }

    async fn subscribe(&self, table: Table, filter: Filter, kinds: EventKinds) -> Result<Subscription> {
        self.inner.subscribe(table, filter, kinds).await
    }
}

pub async fn signup(store: &dyn RemoteStore, email: &str, organization: &str) -> Profile {
    actions::signup(
        store,
        SignupRequest {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            organization_name: organization.to_string(),
        },
    )
    .await
    .unwrap()
}

pub async fn seed_document(store: &dyn RemoteStore, author: &Profile, title: &str) -> Document {
    actions::create_document(
        store,
        author,
        NewDocument {
            id: Uuid::new_v4(),
            title: title.to_string(),
            content: format!("{} body", title),
        },
    )
    .await
    .unwrap()
}

pub async fn seed_revision(store: &dyn RemoteStore, author: &Profile, document_id: Uuid) -> Revision {
    actions::create_revision(
        store,
        author,
        NewRevision {
            id: Uuid::new_v4(),
            document_id,
            content: "A suggested rewrite".to_string(),
        },
    )
    .await
    .unwrap()
}

pub async fn open_session(store: Arc<dyn RemoteStore>, user: &Profile) -> Session {
    Session::open(store, user.id, ClientConfig::new()).await.unwrap()
}

/// Lets spawned tasks run until they block again.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
