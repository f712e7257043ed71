use super::{ReconcileOutcome, ReconcileScope, RealtimeReconciler};
use crate::core::Result;
use crate::remote::{EventKind, EventKinds, Filter, Subscription, Table};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, Level, event, info_span};
use uuid::Uuid;

/// One reconciled event, as reported to channel observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledEvent {
    pub table: Table,
    pub kind: EventKind,
    pub record_id: Option<Uuid>,
    pub outcome: ReconcileOutcome,
}

/// A set of subscriptions feeding one reconciler.
///
/// Each subscription is drained by its own task, so events of one feed are
/// applied in delivery order while feeds stay independent of each other.
/// `unsubscribe` stops every task and closes every subscription before it
/// returns; dropping the handle aborts the tasks instead.
pub struct RealtimeChannel {
    name: String,
    shutdown: watch::Sender<bool>,
    outcomes: broadcast::Sender<ReconciledEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl RealtimeChannel {
    fn new(name: String) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (outcomes, _) = broadcast::channel(256);
        Self {
            name,
            shutdown,
            outcomes,
            tasks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Observes every event the channel reconciles from now on.
    pub fn outcomes(&self) -> broadcast::Receiver<ReconciledEvent> {
        self.outcomes.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }

    fn spawn(&mut self, reconciler: RealtimeReconciler, scope: ReconcileScope, mut subscription: Subscription) {
        let mut shutdown = self.shutdown.subscribe();
        let outcomes = self.outcomes.clone();
        let span = info_span!("realtime.subscription", channel = %self.name, subscription = %subscription.id());
        let task = tokio::spawn(
            async move {
                loop {
                    let change = tokio::select! {
                        _ = shutdown.changed() => break,
                        change = subscription.next() => match change {
                            Some(change) => change,
                            None => break,
                        },
                    };
                    let reported = ReconciledEvent {
                        table: change.table(),
                        kind: change.kind(),
                        record_id: change.record_id(),
                        outcome: ReconcileOutcome::Dropped,
                    };
                    match reconciler.apply(scope, change).await {
                        Ok(outcome) => {
                            let _ = outcomes.send(ReconciledEvent { outcome, ..reported });
                        }
                        Err(err) => {
                            event!(Level::ERROR, error = %err, "reconciliation failed");
                        }
                    }
                }
                subscription.unsubscribe();
            }
            .instrument(span),
        );
        self.tasks.push(task);
    }

    /// Stops every subscription task and waits for them to finish.
    pub async fn unsubscribe(mut self) {
        let _ = self.shutdown.send(true);
        for task in std::mem::take(&mut self.tasks) {
            if let Err(err) = task.await {
                event!(Level::WARN, channel = %self.name, error = %err, "subscription task ended abnormally");
            }
        }
        event!(Level::INFO, channel = %self.name, "realtime channel closed");
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("name", &self.name)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl RealtimeReconciler {
    async fn open(&self, table: Table, filter: Filter, kinds: EventKinds) -> Result<Subscription> {
        self.store().subscribe(table, filter, kinds).await
    }

    /// Mirrors an organization's documents and activity feed.
    pub async fn watch_organization(&self, organization_id: Uuid) -> Result<RealtimeChannel> {
        let scope = ReconcileScope::Organization(organization_id);
        let by_org = || Filter::new().eq("organizationId", organization_id);

        let documents = self.open(Table::Document, by_org(), EventKinds::ALL).await?;
        let activity = self.open(Table::DocumentActivity, by_org(), EventKinds::INSERT).await?;

        let mut channel = RealtimeChannel::new(scope.to_string());
        channel.spawn(self.clone(), scope, documents);
        channel.spawn(self.clone(), scope, activity);
        event!(Level::INFO, channel = %channel.name, "realtime channel opened");
        Ok(channel)
    }

    /// Mirrors one document, its revisions and its activity.
    pub async fn watch_document(&self, document_id: Uuid) -> Result<RealtimeChannel> {
        let scope = ReconcileScope::Document(document_id);

        let document = self
            .open(
                Table::Document,
                Filter::by_id(document_id),
                EventKinds::only(&[EventKind::Update, EventKind::Delete]),
            )
            .await?;
        let revisions = self
            .open(
                Table::Revision,
                Filter::new().eq("documentId", document_id),
                EventKinds::ALL,
            )
            .await?;
        let activity = self
            .open(
                Table::DocumentActivity,
                Filter::new().eq("documentId", document_id),
                EventKinds::INSERT,
            )
            .await?;

        let mut channel = RealtimeChannel::new(scope.to_string());
        channel.spawn(self.clone(), scope, document);
        channel.spawn(self.clone(), scope, revisions);
        channel.spawn(self.clone(), scope, activity);
        event!(Level::INFO, channel = %channel.name, "realtime channel opened");
        Ok(channel)
    }
}
