// ============================================================================
// Server Actions
// ============================================================================
//
// Authoritative writes against the remote store. Every entity change is
// batched with its audit row so the two commit or fail together, and every
// write is scoped to the acting profile's organization.
//
// ============================================================================

pub mod auth;
pub mod documents;

pub use auth::{SignupRequest, require_profile, resolve_profile, signup, slugify};
pub use documents::{
    DocumentChanges, MIN_REVISION_CONTENT, NewDocument, NewRevision, accept_revision,
    create_document, create_revision, delete_document, load_document, load_revision,
    reject_revision, update_document, validate_revision_content, validate_title,
};
