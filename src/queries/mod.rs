// ============================================================================
// Queries
// ============================================================================
//
// Read side of the client: fetchers that assemble view shapes from raw rows
// and a cache-first client that serves them to views as `QueryState`s.
//
// ============================================================================

pub mod client;
pub mod fetch;
pub mod lookup;

pub use client::{QueryClient, QueryState};
pub use fetch::{
    fetch_activity_feed, fetch_document_detail, fetch_document_timeline, fetch_documents_page,
    fetch_profile, pending_revisions,
};
pub use lookup::{document_ref, document_refs, profile_ref, profile_refs};
