use super::CachedValue;
use std::time::Duration;
use tokio::time::Instant;

/// One cached query result plus its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub(crate) value: Option<CachedValue>,
    /// Cache clock value of the last change to `value`.
    pub(crate) version: u64,
    pub(crate) fetched_at: Option<Instant>,
    pub(crate) last_access: Instant,
    /// Set by invalidation; forces a refetch on next access.
    pub(crate) invalidated: bool,
    pub(crate) fetching: bool,
    pub(crate) error: Option<String>,
}

impl CacheEntry {
    pub(crate) fn empty(now: Instant) -> Self {
        Self {
            value: None,
            version: 0,
            fetched_at: None,
            last_access: now,
            invalidated: false,
            fetching: false,
            error: None,
        }
    }

    pub(crate) fn is_stale(&self, now: Instant, stale_time: Duration) -> bool {
        if self.invalidated || self.value.is_none() {
            return true;
        }
        match self.fetched_at {
            Some(fetched_at) => now.saturating_duration_since(fetched_at) >= stale_time,
            None => true,
        }
    }

    pub(crate) fn state(&self, now: Instant, stale_time: Duration) -> EntryState {
        EntryState {
            version: self.version,
            has_value: self.value.is_some(),
            stale: self.is_stale(now, stale_time),
            fetching: self.fetching,
            error: self.error.clone(),
        }
    }
}

/// Read-only view of an entry's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryState {
    pub version: u64,
    pub has_value: bool,
    pub stale: bool,
    pub fetching: bool,
    pub error: Option<String>,
}
