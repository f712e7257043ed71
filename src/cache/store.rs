use super::{
    AppliedPatches, CachePatch, CacheSnapshot, CacheShape, CachedValue, EntryState, QueryKey,
    RollbackReport, entry::CacheEntry, revert::Revert, snapshot::PatchedEntry,
};
use crate::config::ClientConfig;
use crate::core::Result;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{Level, event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheChange {
    Updated,
    Invalidated,
    Removed,
    Evicted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNotification {
    pub key: QueryKey,
    pub change: CacheChange,
    pub version: u64,
}

struct CacheState {
    entries: LruCache<QueryKey, CacheEntry>,
    /// Monotonic version source shared by all entries.
    clock: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

struct Shared {
    state: Mutex<CacheState>,
    notifications: broadcast::Sender<CacheNotification>,
    stale_time: Duration,
    gc_time: Duration,
}

/// In-memory keyed store of query results.
///
/// Cloning yields another handle to the same cache. Every operation is
/// synchronous and completes under one short lock, so a patch is visible to
/// all readers as soon as the call returns. Updaters run against a copy of
/// the value and are committed only when they change it, which keeps repeated
/// identical updates from bumping versions or notifying subscribers.
#[derive(Clone)]
pub struct ClientCache {
    shared: Arc<Shared>,
}

impl ClientCache {
    pub fn new(config: &ClientConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(CacheState {
                    entries: LruCache::new(capacity),
                    clock: 0,
                }),
                notifications,
                stale_time: config.stale_time,
                gc_time: config.gc_time,
            }),
        }
    }

    /// Receives a notification for every committed change.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheNotification> {
        self.shared.notifications.subscribe()
    }

    fn emit(&self, notifications: Vec<CacheNotification>) {
        for notification in notifications {
            // No receivers is fine.
            let _ = self.shared.notifications.send(notification);
        }
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().map_or(0, |state| state.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Result<Vec<QueryKey>> {
        let state = self.shared.state.lock()?;
        Ok(state.entries.iter().map(|(key, _)| key.clone()).collect())
    }

    /// Reads a value and marks the entry as recently used.
    pub fn get(&self, key: &QueryKey) -> Result<Option<CachedValue>> {
        let mut state = self.shared.state.lock()?;
        Ok(state.entries.get_mut(key).and_then(|entry| {
            entry.last_access = Instant::now();
            entry.value.clone()
        }))
    }

    pub fn get_as<T: CacheShape>(&self, key: &QueryKey) -> Result<Option<T>> {
        Ok(self.get(key)?.and_then(T::from_cached))
    }

    /// Reads a value without affecting recency.
    pub fn peek(&self, key: &QueryKey) -> Result<Option<CachedValue>> {
        let state = self.shared.state.lock()?;
        Ok(state.entries.peek(key).and_then(|entry| entry.value.clone()))
    }

    pub fn state(&self, key: &QueryKey) -> Result<Option<EntryState>> {
        let state = self.shared.state.lock()?;
        let now = Instant::now();
        Ok(state
            .entries
            .peek(key)
            .map(|entry| entry.state(now, self.shared.stale_time)))
    }

    /// Missing, invalidated or older than `stale_time`.
    pub fn is_stale(&self, key: &QueryKey) -> Result<bool> {
        let state = self.shared.state.lock()?;
        Ok(state
            .entries
            .peek(key)
            .is_none_or(|entry| entry.is_stale(Instant::now(), self.shared.stale_time)))
    }

    /// Stores a fresh result for `key`, returning its version.
    pub fn set(&self, key: QueryKey, value: CachedValue) -> Result<u64> {
        let now = Instant::now();
        let mut notifications = Vec::new();
        let version = {
            let mut state = self.shared.state.lock()?;
            let version = state.tick();
            if let Some(entry) = state.entries.get_mut(&key) {
                entry.value = Some(value);
                entry.version = version;
                entry.fetched_at = Some(now);
                entry.last_access = now;
                entry.invalidated = false;
                entry.fetching = false;
                entry.error = None;
            } else {
                let mut entry = CacheEntry::empty(now);
                entry.value = Some(value);
                entry.version = version;
                entry.fetched_at = Some(now);
                if let Some((evicted, _)) = state.entries.push(key.clone(), entry) {
                    event!(Level::DEBUG, key = %evicted, "cache entry evicted by capacity");
                    notifications.push(CacheNotification {
                        key: evicted,
                        change: CacheChange::Evicted,
                        version,
                    });
                }
            }
            version
        };
        notifications.push(CacheNotification {
            key,
            change: CacheChange::Updated,
            version,
        });
        self.emit(notifications);
        Ok(version)
    }

    /// Applies `updater` to one entry's value. Returns whether it changed.
    pub fn update<F>(&self, key: &QueryKey, updater: F) -> Result<bool>
    where
        F: FnOnce(&mut CachedValue),
    {
        let mut updater = Some(updater);
        let touched = self.update_many(
            |candidate| candidate == key,
            |_, value| {
                if let Some(updater) = updater.take() {
                    updater(value);
                }
            },
        )?;
        Ok(!touched.is_empty())
    }

    /// Applies `updater` to every live entry whose key satisfies `predicate`.
    /// Returns the keys whose value actually changed.
    pub fn update_many<P, F>(&self, predicate: P, mut updater: F) -> Result<Vec<QueryKey>>
    where
        P: Fn(&QueryKey) -> bool,
        F: FnMut(&QueryKey, &mut CachedValue),
    {
        let now = Instant::now();
        let mut notifications = Vec::new();
        {
            let mut guard = self.shared.state.lock()?;
            let CacheState { entries, clock } = &mut *guard;
            for (key, entry) in entries.iter_mut() {
                if !predicate(key) {
                    continue;
                }
                let Some(current) = entry.value.as_ref() else {
                    continue;
                };
                let mut next = current.clone();
                updater(key, &mut next);
                if &next == current {
                    continue;
                }
                *clock += 1;
                entry.value = Some(next);
                entry.version = *clock;
                entry.last_access = now;
                notifications.push(CacheNotification {
                    key: key.clone(),
                    change: CacheChange::Updated,
                    version: *clock,
                });
            }
        }
        let touched = notifications.iter().map(|note| note.key.clone()).collect();
        self.emit(notifications);
        Ok(touched)
    }

    /// Marks `key` stale so the next access refetches. Data stays readable.
    pub fn invalidate(&self, key: &QueryKey) -> Result<bool> {
        Ok(self.invalidate_many(|candidate| candidate == key)? > 0)
    }

    pub fn invalidate_many<P>(&self, predicate: P) -> Result<usize>
    where
        P: Fn(&QueryKey) -> bool,
    {
        let mut notifications = Vec::new();
        {
            let mut state = self.shared.state.lock()?;
            for (key, entry) in state.entries.iter_mut() {
                if predicate(key) && !entry.invalidated {
                    entry.invalidated = true;
                    notifications.push(CacheNotification {
                        key: key.clone(),
                        change: CacheChange::Invalidated,
                        version: entry.version,
                    });
                }
            }
        }
        let count = notifications.len();
        self.emit(notifications);
        Ok(count)
    }

    pub fn remove(&self, key: &QueryKey) -> Result<Option<CachedValue>> {
        let removed = {
            let mut state = self.shared.state.lock()?;
            let version = state.tick();
            state.entries.pop(key).map(|entry| (entry.value, version))
        };
        match removed {
            Some((value, version)) => {
                self.emit(vec![CacheNotification {
                    key: key.clone(),
                    change: CacheChange::Removed,
                    version,
                }]);
                Ok(value)
            }
            None => Ok(None),
        }
    }

    /// Removes every entry whose key satisfies `predicate`.
    pub fn remove_many<P>(&self, predicate: P) -> Result<Vec<QueryKey>>
    where
        P: Fn(&QueryKey) -> bool,
    {
        let keys: Vec<QueryKey> = self
            .keys()?
            .into_iter()
            .filter(|key| predicate(key))
            .collect();
        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            if self.remove(&key)?.is_some() {
                removed.push(key);
            }
        }
        Ok(removed)
    }

    /// Records that a fetch for `key` is in flight and returns the entry's
    /// current version, to be handed back to [`ClientCache::complete_fetch`].
    pub fn begin_fetch(&self, key: &QueryKey) -> Result<u64> {
        let now = Instant::now();
        let mut state = self.shared.state.lock()?;
        if let Some(entry) = state.entries.get_mut(key) {
            entry.fetching = true;
            entry.last_access = now;
            return Ok(entry.version);
        }
        let mut entry = CacheEntry::empty(now);
        entry.fetching = true;
        if let Some((evicted, _)) = state.entries.push(key.clone(), entry) {
            event!(Level::DEBUG, key = %evicted, "cache entry evicted by capacity");
        }
        Ok(0)
    }

    /// Stores a fetched result unless the entry changed while the fetch was in
    /// flight. A result that lost the race is discarded and the entry is
    /// marked for refetch. Returns whether the result was stored.
    pub fn complete_fetch(&self, key: &QueryKey, value: CachedValue, started_at: u64) -> Result<bool> {
        {
            let mut state = self.shared.state.lock()?;
            match state.entries.peek_mut(key) {
                Some(entry) if entry.version != started_at => {
                    entry.fetching = false;
                    entry.invalidated = true;
                    event!(Level::DEBUG, key = %key, "fetched result superseded by a local change");
                    return Ok(false);
                }
                _ => {}
            }
        }
        self.set(key.clone(), value)?;
        Ok(true)
    }

    /// Records a failed fetch. Previously cached data is kept.
    pub fn fail_fetch(&self, key: &QueryKey, error: impl Into<String>) -> Result<()> {
        let mut state = self.shared.state.lock()?;
        if let Some(entry) = state.entries.get_mut(key) {
            entry.fetching = false;
            entry.error = Some(error.into());
        }
        Ok(())
    }

    /// Copies every live entry whose key satisfies `predicate`.
    pub fn snapshot<P>(&self, predicate: P) -> Result<CacheSnapshot>
    where
        P: Fn(&QueryKey) -> bool,
    {
        let state = self.shared.state.lock()?;
        let entries = state
            .entries
            .iter()
            .filter(|(key, entry)| predicate(key) && entry.value.is_some())
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect();
        Ok(CacheSnapshot { entries })
    }

    /// Writes every snapshot entry back unconditionally.
    pub fn restore(&self, snapshot: &CacheSnapshot) -> Result<()> {
        for (key, value) in &snapshot.entries {
            match value {
                Some(value) => {
                    self.set(key.clone(), value.clone())?;
                }
                None => {
                    self.remove(key)?;
                }
            }
        }
        Ok(())
    }

    /// Snapshots and patches every matching entry in one critical section.
    pub fn apply_patches(&self, patches: &[CachePatch]) -> Result<AppliedPatches> {
        let now = Instant::now();
        let mut applied = AppliedPatches::default();
        let mut notifications = Vec::new();
        {
            let mut guard = self.shared.state.lock()?;
            let CacheState { entries, clock } = &mut *guard;
            for (key, entry) in entries.iter_mut() {
                let Some(current) = entry.value.clone() else {
                    continue;
                };
                let mut next = current.clone();
                let mut matched = false;
                for patch in patches.iter().filter(|patch| patch.matches(key)) {
                    patch.apply_to(key, &mut next);
                    matched = true;
                }
                if !matched || next == current {
                    continue;
                }
                *clock += 1;
                entry.value = Some(next.clone());
                entry.version = *clock;
                entry.last_access = now;
                applied.entries.push(PatchedEntry {
                    key: key.clone(),
                    previous: current,
                    patched: next,
                    version: *clock,
                });
                notifications.push(CacheNotification {
                    key: key.clone(),
                    change: CacheChange::Updated,
                    version: *clock,
                });
            }
        }
        self.emit(notifications);
        Ok(applied)
    }

    /// Reverts an optimistic application.
    ///
    /// Entries still at the version the patch produced get their previous
    /// value back. Entries changed since are reverted record by record: what
    /// still holds the patched value is restored and later changes are kept.
    /// Every entry is marked for refetch.
    pub fn rollback(&self, applied: &AppliedPatches) -> Result<RollbackReport> {
        let mut report = RollbackReport::default();
        let mut notifications = Vec::new();
        {
            let mut guard = self.shared.state.lock()?;
            let CacheState { entries, clock } = &mut *guard;
            for patched in &applied.entries {
                let key = &patched.key;
                let Some(entry) = entries.peek_mut(key) else {
                    continue;
                };
                entry.invalidated = true;
                let reverted = match entry.value.as_ref() {
                    Some(_) if entry.version == patched.version => Some(patched.previous.clone()),
                    Some(current) => {
                        let mut next = current.clone();
                        next.revert(&patched.previous, &patched.patched);
                        Some(next)
                    }
                    None => None,
                };
                match reverted {
                    Some(next) if entry.value.as_ref() != Some(&next) => {
                        *clock += 1;
                        entry.value = Some(next);
                        entry.version = *clock;
                        report.restored.push(key.clone());
                        notifications.push(CacheNotification {
                            key: key.clone(),
                            change: CacheChange::Updated,
                            version: *clock,
                        });
                    }
                    _ => {
                        report.superseded.push(key.clone());
                        notifications.push(CacheNotification {
                            key: key.clone(),
                            change: CacheChange::Invalidated,
                            version: entry.version,
                        });
                    }
                }
            }
        }
        self.emit(notifications);
        Ok(report)
    }

    /// Evicts entries untouched for longer than `gc_time`.
    pub fn collect_garbage(&self) -> Result<usize> {
        let now = Instant::now();
        let mut notifications = Vec::new();
        {
            let mut state = self.shared.state.lock()?;
            let expired: Vec<QueryKey> = state
                .entries
                .iter()
                .filter(|(_, entry)| {
                    !entry.fetching
                        && now.saturating_duration_since(entry.last_access) >= self.shared.gc_time
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in expired {
                if let Some(entry) = state.entries.pop(&key) {
                    notifications.push(CacheNotification {
                        key,
                        change: CacheChange::Evicted,
                        version: entry.version,
                    });
                }
            }
        }
        let count = notifications.len();
        if count > 0 {
            event!(Level::DEBUG, evicted = count, "cache garbage collected");
        }
        self.emit(notifications);
        Ok(count)
    }
}

impl std::fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCache")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Collection, KeyPrefix};
    use crate::model::{DocumentSummary, DocumentsPage, ProfileRef, RevisionCounts};
    use chrono::Utc;
    use uuid::Uuid;

    fn page(titles: &[(Uuid, &str)]) -> CachedValue {
        let documents = titles
            .iter()
            .map(|(id, title)| DocumentSummary {
                id: *id,
                title: title.to_string(),
                content: String::new(),
                updated_at: chrono::DateTime::<Utc>::UNIX_EPOCH,
                author: ProfileRef::new(Uuid::nil(), "author@example.com"),
                counts: RevisionCounts::default(),
            })
            .collect();
        CachedValue::DocumentsPage(DocumentsPage {
            documents,
            next_cursor: None,
        })
    }

    fn rename(id: Uuid, title: &'static str) -> CachePatch {
        CachePatch::new(KeyPrefix::collection(Collection::Documents), move |_, value| {
            if let Some(doc) = value.as_documents_page_mut().and_then(|page| page.get_mut(id)) {
                doc.title = title.to_string();
            }
        })
    }

    #[test]
    fn test_unchanged_update_keeps_version() {
        let cache = ClientCache::new(&ClientConfig::default());
        let key = QueryKey::documents(Uuid::new_v4(), 10);
        let doc = Uuid::new_v4();
        let version = cache.set(key.clone(), page(&[(doc, "Old")])).unwrap();

        let touched = cache.update_many(|_| true, |_, _| {}).unwrap();
        assert!(touched.is_empty());
        assert_eq!(cache.state(&key).unwrap().unwrap().version, version);
    }

    #[test]
    fn test_rollback_restores_untouched_entries() {
        let cache = ClientCache::new(&ClientConfig::default());
        let key = QueryKey::documents(Uuid::new_v4(), 10);
        let doc = Uuid::new_v4();
        cache.set(key.clone(), page(&[(doc, "Old")])).unwrap();
        let before = cache.peek(&key).unwrap();

        let applied = cache.apply_patches(&[rename(doc, "New")]).unwrap();
        assert_eq!(applied.touched().count(), 1);

        let report = cache.rollback(&applied).unwrap();
        assert_eq!(report.restored, vec![key.clone()]);
        assert_eq!(cache.peek(&key).unwrap(), before);
        assert!(cache.is_stale(&key).unwrap());
    }

    #[test]
    fn test_rollback_leaves_superseded_entries() {
        let cache = ClientCache::new(&ClientConfig::default());
        let key = QueryKey::documents(Uuid::new_v4(), 10);
        let doc = Uuid::new_v4();
        cache.set(key.clone(), page(&[(doc, "Old")])).unwrap();

        let first = cache.apply_patches(&[rename(doc, "First")]).unwrap();
        cache.apply_patches(&[rename(doc, "Second")]).unwrap();

        let report = cache.rollback(&first).unwrap();
        assert_eq!(report.superseded, vec![key.clone()]);
        assert_eq!(cache.peek(&key).unwrap(), Some(page(&[(doc, "Second")])));
    }

    #[test]
    fn test_rollback_survives_change_to_another_record() {
        let cache = ClientCache::new(&ClientConfig::default());
        let key = QueryKey::documents(Uuid::new_v4(), 10);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        cache.set(key.clone(), page(&[(a, "Old"), (b, "Other")])).unwrap();

        let applied = cache.apply_patches(&[rename(a, "New")]).unwrap();
        cache.apply_patches(&[rename(b, "Other v2")]).unwrap();

        let report = cache.rollback(&applied).unwrap();
        assert_eq!(report.restored, vec![key.clone()]);
        assert_eq!(cache.peek(&key).unwrap(), Some(page(&[(a, "Old"), (b, "Other v2")])));
        assert!(cache.is_stale(&key).unwrap());
    }

    #[test]
    fn test_fetch_result_discarded_after_local_patch() {
        let cache = ClientCache::new(&ClientConfig::default());
        let key = QueryKey::documents(Uuid::new_v4(), 10);
        let doc = Uuid::new_v4();
        cache.set(key.clone(), page(&[(doc, "Old")])).unwrap();

        let started = cache.begin_fetch(&key).unwrap();
        cache.apply_patches(&[rename(doc, "Local")]).unwrap();
        let stored = cache.complete_fetch(&key, page(&[(doc, "Old")]), started).unwrap();

        assert!(!stored);
        assert_eq!(cache.peek(&key).unwrap(), Some(page(&[(doc, "Local")])));
        assert!(cache.is_stale(&key).unwrap());
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let cache = ClientCache::new(&ClientConfig::default().max_entries(2));
        let a = QueryKey::document(Uuid::new_v4());
        let b = QueryKey::document(Uuid::new_v4());
        let c = QueryKey::document(Uuid::new_v4());
        cache.set(a.clone(), page(&[])).unwrap();
        cache.set(b.clone(), page(&[])).unwrap();
        cache.get(&a).unwrap();
        cache.set(c.clone(), page(&[])).unwrap();

        assert!(cache.peek(&a).unwrap().is_some());
        assert!(cache.peek(&b).unwrap().is_none());
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_staleness_and_garbage_collection() {
        let config = ClientConfig::default()
            .stale_time(Duration::from_secs(60))
            .gc_time(Duration::from_secs(120));
        let cache = ClientCache::new(&config);
        let key = QueryKey::document(Uuid::new_v4());
        cache.set(key.clone(), page(&[])).unwrap();
        assert!(!cache.is_stale(&key).unwrap());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.is_stale(&key).unwrap());
        assert_eq!(cache.collect_garbage().unwrap(), 0);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.collect_garbage().unwrap(), 1);
        assert!(cache.is_empty());
    }
}
