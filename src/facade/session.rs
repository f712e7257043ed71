use crate::actions;
use crate::cache::ClientCache;
use crate::config::ClientConfig;
use crate::core::{ColabError, Result};
use crate::model::Profile;
use crate::mutation::{MutationCoordinator, Notifier};
use crate::queries::QueryClient;
use crate::realtime::{RealtimeChannel, RealtimeReconciler};
use crate::remote::RemoteStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{Level, event};
use uuid::Uuid;

/// One signed-in client.
///
/// Queries, mutations and realtime reconciliation all share the session's
/// single cache. A session whose identity has no profile can still be opened;
/// every read and write it attempts fails with `Unauthorized`.
pub struct Session {
    config: ClientConfig,
    cache: ClientCache,
    store: Arc<dyn RemoteStore>,
    actor: Option<Profile>,
    queries: Option<QueryClient>,
    mutations: MutationCoordinator,
    reconciler: RealtimeReconciler,
}

impl Session {
    pub async fn open(store: Arc<dyn RemoteStore>, user_id: Uuid, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let actor = actions::resolve_profile(store.as_ref(), user_id).await?;
        match &actor {
            Some(profile) => event!(
                Level::INFO,
                user = %user_id,
                organization = %profile.organization_id,
                "session opened"
            ),
            None => event!(Level::WARN, user = %user_id, "session opened without a profile"),
        }

        let cache = ClientCache::new(&config);
        let queries = actor
            .as_ref()
            .map(|profile| QueryClient::new(cache.clone(), Arc::clone(&store), profile.organization_id));
        let mutations = MutationCoordinator::new(cache.clone(), Arc::clone(&store), actor.clone());
        let reconciler = RealtimeReconciler::new(cache.clone(), Arc::clone(&store));

        Ok(Self {
            config,
            cache,
            store,
            actor,
            queries,
            mutations,
            reconciler,
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.mutations = self.mutations.with_notifier(notifier);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn actor(&self) -> Option<&Profile> {
        self.actor.as_ref()
    }

    pub fn require_actor(&self) -> Result<&Profile> {
        self.mutations.actor()
    }

    pub fn queries(&self) -> Result<&QueryClient> {
        self.queries
            .as_ref()
            .ok_or_else(|| ColabError::Unauthorized("no profile for the current session".into()))
    }

    pub fn mutations(&self) -> &MutationCoordinator {
        &self.mutations
    }

    pub fn reconciler(&self) -> &RealtimeReconciler {
        &self.reconciler
    }

    /// Subscribes to the session organization's change feeds.
    pub async fn watch_organization(&self) -> Result<RealtimeChannel> {
        let organization_id = self.require_actor()?.organization_id;
        self.reconciler.watch_organization(organization_id).await
    }

    pub async fn watch_document(&self, document_id: Uuid) -> Result<RealtimeChannel> {
        self.require_actor()?;
        self.reconciler.watch_document(document_id).await
    }

    /// Evicts cache entries untouched for longer than `gc_time` every
    /// `interval`, until the returned task is aborted.
    pub fn spawn_garbage_collector(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.cache.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(err) = cache.collect_garbage() {
                    event!(Level::ERROR, error = %err, "cache garbage collection failed");
                }
            }
        })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("actor", &self.actor.as_ref().map(|actor| actor.id))
            .field("cache", &self.cache)
            .finish()
    }
}
