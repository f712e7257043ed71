// ============================================================================
// Snapshots and Optimistic Patches
// ============================================================================
//
// A patch is applied to every live entry its prefix matches. The cache
// records, per entry it actually changed, the previous value, the value the
// patch produced and the resulting version. Rollback restores an entry
// outright while it still holds that version. Otherwise only the records and
// fields still carrying the patched value are reverted, so a rollback never
// clobbers a later write.
//
// ============================================================================

use super::{CachedValue, KeyPrefix, QueryKey};

type PatchFn = Box<dyn Fn(&QueryKey, &mut CachedValue) + Send + Sync>;

/// A structural update addressed by key prefix.
pub struct CachePatch {
    prefix: KeyPrefix,
    apply: PatchFn,
}

impl CachePatch {
    pub fn new<F>(prefix: KeyPrefix, apply: F) -> Self
    where
        F: Fn(&QueryKey, &mut CachedValue) + Send + Sync + 'static,
    {
        Self {
            prefix,
            apply: Box::new(apply),
        }
    }

    pub fn prefix(&self) -> &KeyPrefix {
        &self.prefix
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        self.prefix.matches(key)
    }

    pub fn apply_to(&self, key: &QueryKey, value: &mut CachedValue) {
        (self.apply)(key, value)
    }
}

impl std::fmt::Debug for CachePatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePatch").field("prefix", &self.prefix).finish()
    }
}

/// Point-in-time copy of a set of entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSnapshot {
    pub(crate) entries: Vec<(QueryKey, Option<CachedValue>)>,
}

impl CacheSnapshot {
    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    pub fn get(&self, key: &QueryKey) -> Option<&CachedValue> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == key)
            .and_then(|(_, value)| value.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PatchedEntry {
    pub(crate) key: QueryKey,
    pub(crate) previous: CachedValue,
    pub(crate) patched: CachedValue,
    /// Version the entry held right after the patch.
    pub(crate) version: u64,
}

/// What an optimistic application changed.
#[derive(Debug, Clone, Default)]
pub struct AppliedPatches {
    pub(crate) entries: Vec<PatchedEntry>,
}

impl AppliedPatches {
    /// Pre-patch values of every changed entry.
    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            entries: self
                .entries
                .iter()
                .map(|entry| (entry.key.clone(), Some(entry.previous.clone())))
                .collect(),
        }
    }

    pub fn touched(&self) -> impl Iterator<Item = &QueryKey> {
        self.entries.iter().map(|entry| &entry.key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    /// Entries whose patched records were reverted, wholly or in part.
    pub restored: Vec<QueryKey>,
    /// Entries where later changes replaced everything the patch wrote.
    pub superseded: Vec<QueryKey>,
}
