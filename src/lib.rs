// ============================================================================
// colabdoc Library
// ============================================================================
//
// Client core of a collaborative document-review application: a shared query
// cache, optimistic mutations with rollback, and realtime reconciliation of
// the remote store's change feed.
//
//   View ──> QueryClient ──────────> ClientCache <── RealtimeReconciler
//     │                                  ^                   ^
//     └──> MutationCoordinator ──patch───┘                   │
//                 │                                          │
//                 └──write──> actions ──> RemoteStore ──events┘
//
// ============================================================================

pub mod actions;
pub mod cache;
pub mod config;
pub mod core;
pub mod facade;
pub mod model;
pub mod mutation;
pub mod queries;
pub mod realtime;
pub mod remote;

// Re-export main types for convenience
pub use cache::{CachedValue, ClientCache, KeyPrefix, QueryKey};
pub use config::ClientConfig;
pub use core::{ColabError, Result};
pub use facade::Session;
pub use mutation::{MutationCoordinator, MutationHandle, Notification, Notifier};
pub use queries::{QueryClient, QueryState};
pub use realtime::{RealtimeChannel, RealtimeReconciler, ReconcileOutcome, ReconcileScope};
pub use remote::{ChangeEvent, InMemoryRemoteStore, RemoteStore, Table};
