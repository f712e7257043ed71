use super::patches::{self, DocumentFields, RevisionFields};
use super::{MutationKind, Notification, Notifier, OptimisticPlan, TracingNotifier};
use crate::actions::{self, DocumentChanges, NewDocument, NewRevision};
use crate::cache::{ClientCache, QueryKey};
use crate::core::{ColabError, Result};
use crate::model::{
    Document, DocumentDetail, DocumentSummary, Profile, ProfileRef, Revision, RevisionStatus,
    RevisionView,
};
use crate::remote::RemoteStore;
use chrono::Utc;
use im::Vector;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{Instrument, Level, event, info_span};
use uuid::Uuid;

/// Completion signal of a submitted mutation.
///
/// The optimistic patch is already visible when the handle is returned;
/// `wait` resolves once the remote write has settled (and, on failure, once
/// the cache has been rolled back).
#[derive(Debug)]
pub struct MutationHandle<T> {
    kind: MutationKind,
    touched: Vec<QueryKey>,
    receiver: oneshot::Receiver<Result<T>>,
}

impl<T> MutationHandle<T> {
    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    /// Cache keys the optimistic patch changed.
    pub fn touched(&self) -> &[QueryKey] {
        &self.touched
    }

    pub async fn wait(self) -> Result<T> {
        self.receiver
            .await
            .map_err(|_| ColabError::ChannelClosed(format!("{} task ended without a result", self.kind)))?
    }
}

/// Runs writes wrapped in optimistic cache patches.
///
/// Patches are applied synchronously inside `submit`, before the write is
/// spawned, so mutations from one session reach the cache in submission
/// order whatever order their writes complete in. Must be used from within a
/// tokio runtime.
#[derive(Clone)]
pub struct MutationCoordinator {
    cache: ClientCache,
    store: Arc<dyn RemoteStore>,
    actor: Option<Profile>,
    notifier: Arc<dyn Notifier>,
}

impl MutationCoordinator {
    pub fn new(cache: ClientCache, store: Arc<dyn RemoteStore>, actor: Option<Profile>) -> Self {
        Self {
            cache,
            store,
            actor,
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn actor(&self) -> Result<&Profile> {
        self.actor
            .as_ref()
            .ok_or_else(|| ColabError::Unauthorized("no profile for the current session".into()))
    }

    /// Applies `plan`, then runs `write` in the background.
    ///
    /// On failure every entry the plan changed is rolled back, marked for
    /// refetch and a notification is emitted.
    pub fn submit<T, W, Fut>(&self, kind: MutationKind, plan: OptimisticPlan, write: W) -> Result<MutationHandle<T>>
    where
        T: Send + 'static,
        W: FnOnce(Arc<dyn RemoteStore>) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let span = info_span!("mutation.submit", kind = %kind);
        let applied = {
            let _enter = span.enter();
            let applied = self.cache.apply_patches(plan.patches())?;
            event!(Level::DEBUG, patched = applied.touched().count(), "optimistic patch applied");
            applied
        };
        let touched = applied.touched().cloned().collect();

        let (sender, receiver) = oneshot::channel();
        let cache = self.cache.clone();
        let notifier = Arc::clone(&self.notifier);
        let write = write(Arc::clone(&self.store));
        tokio::spawn(
            async move {
                let result = write.await;
                if let Err(err) = &result {
                    match cache.rollback(&applied) {
                        Ok(report) => event!(
                            Level::WARN,
                            error = %err,
                            restored = report.restored.len(),
                            superseded = report.superseded.len(),
                            "mutation rolled back"
                        ),
                        Err(rollback_err) => event!(
                            Level::ERROR,
                            error = %err,
                            rollback_error = %rollback_err,
                            "mutation rollback failed"
                        ),
                    }
                    notifier.notify(Notification {
                        kind,
                        message: err.to_string(),
                    });
                } else {
                    event!(Level::DEBUG, "mutation confirmed");
                }
                // The caller may have dropped the handle.
                let _ = sender.send(result);
            }
            .instrument(span),
        );

        Ok(MutationHandle {
            kind,
            touched,
            receiver,
        })
    }

    pub fn create_document(&self, input: NewDocument) -> Result<MutationHandle<Document>> {
        let actor = self.actor()?.clone();
        actions::validate_title(&input.title)?;

        let summary = DocumentSummary {
            id: input.id,
            title: input.title.clone(),
            content: input.content.clone(),
            updated_at: Utc::now(),
            author: ProfileRef::from(&actor),
            counts: Default::default(),
        };
        let plan = OptimisticPlan::new().with(patches::prepend_document(actor.organization_id, summary));
        self.submit(MutationKind::CreateDocument, plan, move |store| async move {
            actions::create_document(store.as_ref(), &actor, input).await
        })
    }

    pub fn update_document(&self, changes: DocumentChanges) -> Result<MutationHandle<Document>> {
        let actor = self.actor()?.clone();
        actions::validate_title(&changes.title)?;

        let fields = DocumentFields {
            title: Some(changes.title.clone()),
            content: Some(changes.content.clone()),
            ..Default::default()
        };
        let plan = OptimisticPlan::new()
            .with(patches::patch_document_lists(
                Some(actor.organization_id),
                changes.id,
                fields.clone(),
            ))
            .with(patches::patch_document_detail(changes.id, fields));
        self.submit(MutationKind::UpdateDocument, plan, move |store| async move {
            actions::update_document(store.as_ref(), &actor, changes).await
        })
    }

    pub fn delete_document(&self, document_id: Uuid) -> Result<MutationHandle<Document>> {
        let actor = self.actor()?.clone();

        let fields = DocumentFields {
            deleted_at: Some(Utc::now()),
            ..Default::default()
        };
        let plan = OptimisticPlan::new()
            .with(patches::remove_document_from_lists(Some(actor.organization_id), document_id))
            .with(patches::patch_document_detail(document_id, fields));
        self.submit(MutationKind::DeleteDocument, plan, move |store| async move {
            actions::delete_document(store.as_ref(), &actor, document_id).await
        })
    }

    pub fn create_revision(&self, input: NewRevision) -> Result<MutationHandle<Revision>> {
        let actor = self.actor()?.clone();
        actions::validate_revision_content(&input.content)?;

        let now = Utc::now();
        let view = RevisionView {
            id: input.id,
            document_id: input.document_id,
            content: input.content.clone(),
            status: RevisionStatus::Pending,
            created_at: now,
            updated_at: now,
            author: ProfileRef::from(&actor),
            activities: Vector::new(),
        };
        let plan = OptimisticPlan::new()
            .with(patches::prepend_revision(input.document_id, view))
            .with(patches::adjust_pending_count(actor.organization_id, input.document_id, 1));
        self.submit(MutationKind::CreateRevision, plan, move |store| async move {
            actions::create_revision(store.as_ref(), &actor, input).await
        })
    }

    pub fn accept_revision(&self, document_id: Uuid, revision_id: Uuid) -> Result<MutationHandle<Revision>> {
        self.settle_revision(document_id, revision_id, RevisionStatus::Accepted)
    }

    pub fn reject_revision(&self, document_id: Uuid, revision_id: Uuid) -> Result<MutationHandle<Revision>> {
        self.settle_revision(document_id, revision_id, RevisionStatus::Rejected)
    }

    fn settle_revision(
        &self,
        document_id: Uuid,
        revision_id: Uuid,
        next: RevisionStatus,
    ) -> Result<MutationHandle<Revision>> {
        let actor = self.actor()?.clone();
        // A cached terminal status means the write would be refused anyway.
        let cached = self
            .cache
            .get_as::<DocumentDetail>(&QueryKey::document(document_id))?
            .and_then(|detail| detail.revisions.iter().find(|rev| rev.id == revision_id).map(|rev| rev.status));
        if let Some(status) = cached {
            status.transition(next)?;
        }

        let fields = RevisionFields {
            status: Some(next),
            ..Default::default()
        };
        let plan = OptimisticPlan::new()
            .with(patches::patch_revision(document_id, revision_id, fields))
            .with(patches::adjust_pending_count(actor.organization_id, document_id, -1));
        let kind = match next {
            RevisionStatus::Rejected => MutationKind::RejectRevision,
            _ => MutationKind::AcceptRevision,
        };
        self.submit(kind, plan, move |store| async move {
            match next {
                RevisionStatus::Rejected => actions::reject_revision(store.as_ref(), &actor, revision_id).await,
                _ => actions::accept_revision(store.as_ref(), &actor, revision_id).await,
            }
        })
    }
}

impl std::fmt::Debug for MutationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationCoordinator")
            .field("actor", &self.actor.as_ref().map(|actor| actor.id))
            .finish()
    }
}
