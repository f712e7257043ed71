// ============================================================================
// Mutation Coordinator
// ============================================================================
//
// A mutation is an optimistic plan plus a remote write. The plan is applied
// to the cache before the write is issued; a failed write rolls back what the
// plan changed, record by record, keeping whatever a later change wrote.
// Optimistic patches carry only what the user typed; server timestamps
// arrive with the realtime echo of the write.
//
// ============================================================================

pub mod coordinator;
pub mod notifier;
pub mod patches;
pub mod plan;

pub use coordinator::{MutationCoordinator, MutationHandle};
pub use notifier::{CollectingNotifier, Notification, Notifier, TracingNotifier};
pub use patches::{DocumentFields, RevisionFields};
pub use plan::{MutationKind, OptimisticPlan};
