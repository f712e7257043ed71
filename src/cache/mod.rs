// ============================================================================
// Client Cache
// ============================================================================
//
// Keyed store of query results shared by every reader, the mutation
// coordinator and the realtime reconciler of one session. Keys are
// structured (collection plus scoping parts) and addressed by prefix, so one
// logical change can patch every paginated window of a list at once.
//
// ============================================================================

pub mod entry;
pub mod key;
mod revert;
pub mod snapshot;
pub mod store;
pub mod value;

pub use entry::EntryState;
pub use key::{Collection, KeyPart, KeyPrefix, QueryKey};
pub use snapshot::{AppliedPatches, CachePatch, CacheSnapshot, RollbackReport};
pub use store::{CacheChange, CacheNotification, ClientCache};
pub use value::{CacheShape, CachedValue};
