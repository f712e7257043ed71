// ============================================================================
// Realtime Reconciler
// ============================================================================
//
// Change-feed subscriptions scoped to an organization or a document, merged
// into the client cache as they arrive:
//
//   INSERT  skip ids already present, resolve denormalized fields, prepend
//   UPDATE  merge the changed columns into records already cached
//   DELETE  remove the record from every collection that references it
//
// Redelivered events find the cache already equal and change nothing.
//
// ============================================================================

pub mod channel;
pub mod reconciler;

pub use channel::{RealtimeChannel, ReconciledEvent};
pub use reconciler::{RealtimeReconciler, ReconcileOutcome, ReconcileScope};
