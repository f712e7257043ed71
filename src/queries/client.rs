use super::fetch;
use crate::cache::{CacheShape, ClientCache, QueryKey};
use crate::core::Result;
use crate::model::{ActivityFeed, DocumentDetail, DocumentsPage, Profile};
use crate::remote::RemoteStore;
use std::future::Future;
use std::sync::Arc;
use tracing::{Level, event};
use uuid::Uuid;

/// What a view renders for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub is_pending: bool,
    pub error: Option<String>,
}

impl<T> QueryState<T> {
    pub fn is_success(&self) -> bool {
        self.data.is_some() && self.error.is_none()
    }
}

/// Cache-first reads for the view layer.
///
/// Fresh entries are served without touching the store. Missing, stale or
/// invalidated entries are refetched; a failed fetch keeps whatever data was
/// cached before and reports the error alongside it.
#[derive(Clone)]
pub struct QueryClient {
    cache: ClientCache,
    store: Arc<dyn RemoteStore>,
    organization_id: Uuid,
}

impl QueryClient {
    pub fn new(cache: ClientCache, store: Arc<dyn RemoteStore>, organization_id: Uuid) -> Self {
        Self {
            cache,
            store,
            organization_id,
        }
    }

    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }

    /// Reads the current state of `key` without fetching.
    pub fn peek<T: CacheShape>(&self, key: &QueryKey) -> Result<QueryState<T>> {
        let state = self.cache.state(key)?;
        Ok(QueryState {
            data: self.cache.peek(key)?.and_then(T::from_cached),
            is_pending: state.as_ref().is_some_and(|state| state.fetching),
            error: state.and_then(|state| state.error),
        })
    }

    async fn fetch_query<T, F>(&self, key: QueryKey, fetch: F) -> Result<QueryState<T>>
    where
        T: CacheShape,
        F: Future<Output = Result<T>>,
    {
        if !self.cache.is_stale(&key)? {
            return Ok(QueryState {
                data: self.cache.get_as::<T>(&key)?,
                is_pending: false,
                error: None,
            });
        }

        let started_at = self.cache.begin_fetch(&key)?;
        match fetch.await {
            Ok(value) => {
                if !self.cache.complete_fetch(&key, value.clone().into_cached(), started_at)? {
                    return self.peek(&key);
                }
                event!(Level::TRACE, key = %key, "query fetched");
                Ok(QueryState {
                    data: Some(value),
                    is_pending: false,
                    error: None,
                })
            }
            Err(err) => {
                event!(Level::WARN, key = %key, error = %err, "query failed");
                self.cache.fail_fetch(&key, err.to_string())?;
                self.peek(&key)
            }
        }
    }

    /// Loaded windows of the organization's live documents, starting with
    /// the first. A refetch reloads every page appended by
    /// [`QueryClient::load_more_documents`] so none of them are dropped.
    pub async fn documents(&self, limit: usize) -> Result<QueryState<DocumentsPage>> {
        let key = QueryKey::documents(self.organization_id, limit);
        let fetch_limit = self.loaded_document_pages(&key, limit)?.saturating_mul(limit);
        let fetch = fetch::fetch_documents_page(self.store.as_ref(), self.organization_id, fetch_limit, None);
        self.fetch_query(key, fetch).await
    }

    fn loaded_document_pages(&self, key: &QueryKey, limit: usize) -> Result<usize> {
        let loaded = self
            .cache
            .peek(key)?
            .and_then(DocumentsPage::from_cached)
            .map_or(0, |page| page.documents.len());
        Ok(loaded.div_ceil(limit.max(1)).max(1))
    }

    /// Number of live documents in the organization. Not cached.
    pub async fn documents_count(&self) -> Result<usize> {
        fetch::count_documents(self.store.as_ref(), self.organization_id).await
    }

    pub async fn document(&self, document_id: Uuid) -> Result<QueryState<DocumentDetail>> {
        let key = QueryKey::document(document_id);
        let fetch = fetch::fetch_document_detail(self.store.as_ref(), self.organization_id, document_id);
        self.fetch_query(key, fetch).await
    }

    pub async fn organization_activity(&self, limit: usize) -> Result<QueryState<ActivityFeed>> {
        let key = QueryKey::document_activities(self.organization_id, limit);
        let fetch = fetch::fetch_activity_feed(self.store.as_ref(), self.organization_id, limit, None);
        self.fetch_query(key, fetch).await
    }

    pub async fn document_timeline(&self, document_id: Uuid) -> Result<QueryState<ActivityFeed>> {
        let key = QueryKey::document_timeline(document_id);
        let fetch = fetch::fetch_document_timeline(self.store.as_ref(), self.organization_id, document_id);
        self.fetch_query(key, fetch).await
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<QueryState<Profile>> {
        let key = QueryKey::user_profile(user_id);
        let fetch = fetch::fetch_profile(self.store.as_ref(), user_id);
        self.fetch_query(key, fetch).await
    }

    /// Appends the page after the cached window's cursor to that window,
    /// skipping documents already present. Loads the first window if none is
    /// cached yet.
    pub async fn load_more_documents(&self, limit: usize) -> Result<QueryState<DocumentsPage>> {
        let key = QueryKey::documents(self.organization_id, limit);
        let Some(current) = self.cache.get_as::<DocumentsPage>(&key)? else {
            return self.documents(limit).await;
        };
        let Some(cursor) = current.next_cursor else {
            return self.peek(&key);
        };

        let more = match fetch::fetch_documents_page(self.store.as_ref(), self.organization_id, limit, Some(cursor)).await {
            Ok(more) => more,
            Err(err) => {
                event!(Level::WARN, key = %key, error = %err, "loading more documents failed");
                self.cache.fail_fetch(&key, err.to_string())?;
                return self.peek(&key);
            }
        };

        self.cache.update(&key, move |value| {
            if let Some(page) = value.as_documents_page_mut() {
                let fresh: Vec<_> = more
                    .documents
                    .iter()
                    .filter(|doc| !page.contains(doc.id))
                    .cloned()
                    .collect();
                page.documents.extend(fresh);
                page.next_cursor = more.next_cursor;
            }
        })?;
        self.peek(&key)
    }
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("organization_id", &self.organization_id)
            .finish()
    }
}
