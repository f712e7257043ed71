//! Supplementary lookups for denormalized fields.
//!
//! Raw rows carry foreign keys only. Views embed the referenced profile's
//! email and the referenced document's title; when a referent cannot be
//! loaded the field falls back to an empty string rather than failing the
//! whole read.

use crate::model::{Document, DocumentRef, Profile, ProfileRef};
use crate::remote::{RemoteStore, find_by_id};
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use tracing::{Level, event};
use uuid::Uuid;

pub async fn profile_ref(store: &dyn RemoteStore, id: Uuid) -> ProfileRef {
    match find_by_id::<Profile>(store, id).await {
        Ok(Some(profile)) => ProfileRef::from(&profile),
        Ok(None) => {
            event!(Level::WARN, profile = %id, "referenced profile not found");
            ProfileRef::new(id, "")
        }
        Err(err) => {
            event!(Level::WARN, profile = %id, error = %err, "profile lookup failed");
            ProfileRef::new(id, "")
        }
    }
}

pub async fn document_ref(store: &dyn RemoteStore, id: Uuid) -> DocumentRef {
    let title = match find_by_id::<Document>(store, id).await {
        Ok(Some(document)) => document.title,
        Ok(None) => {
            event!(Level::WARN, document = %id, "referenced document not found");
            String::new()
        }
        Err(err) => {
            event!(Level::WARN, document = %id, error = %err, "document lookup failed");
            String::new()
        }
    };
    DocumentRef { id, title }
}

/// Resolves each distinct profile id once, concurrently.
pub async fn profile_refs<I>(store: &dyn RemoteStore, ids: I) -> HashMap<Uuid, ProfileRef>
where
    I: IntoIterator<Item = Uuid>,
{
    let unique: BTreeSet<Uuid> = ids.into_iter().collect();
    join_all(unique.into_iter().map(|id| profile_ref(store, id)))
        .await
        .into_iter()
        .map(|profile| (profile.id, profile))
        .collect()
}

pub async fn document_refs<I>(store: &dyn RemoteStore, ids: I) -> HashMap<Uuid, DocumentRef>
where
    I: IntoIterator<Item = Uuid>,
{
    let unique: BTreeSet<Uuid> = ids.into_iter().collect();
    join_all(unique.into_iter().map(|id| document_ref(store, id)))
        .await
        .into_iter()
        .map(|document| (document.id, document))
        .collect()
}

pub(crate) fn resolved_profile(refs: &HashMap<Uuid, ProfileRef>, id: Uuid) -> ProfileRef {
    refs.get(&id).cloned().unwrap_or_else(|| ProfileRef::new(id, ""))
}

pub(crate) fn resolved_document(refs: &HashMap<Uuid, DocumentRef>, id: Uuid) -> DocumentRef {
    refs.get(&id).cloned().unwrap_or_else(|| DocumentRef {
        id,
        title: String::new(),
    })
}
