use serde::Serialize;
use uuid::Uuid;

/// Query collections held in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Collection {
    /// Organization document list windows: `[org, limit]`.
    Documents,
    /// One document with its revisions: `[document]`.
    Document,
    /// Organization activity feed windows: `[org, limit]`.
    DocumentActivities,
    /// Activity of one document: `[document]`.
    DocumentTimeline,
    /// Signed-in profile: `[user]`.
    UserProfile,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Documents => "documents",
            Collection::Document => "document",
            Collection::DocumentActivities => "document-activities",
            Collection::DocumentTimeline => "document-timeline",
            Collection::UserProfile => "user-profile",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum KeyPart {
    Id(Uuid),
    Limit(usize),
}

impl std::fmt::Display for KeyPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyPart::Id(id) => write!(f, "\"{}\"", id),
            KeyPart::Limit(limit) => write!(f, "{}", limit),
        }
    }
}

/// Structured cache key: collection name plus scoping parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    collection: Collection,
    parts: Vec<KeyPart>,
}

impl QueryKey {
    pub fn new(collection: Collection, parts: Vec<KeyPart>) -> Self {
        Self { collection, parts }
    }

    pub fn documents(organization_id: Uuid, limit: usize) -> Self {
        Self::new(
            Collection::Documents,
            vec![KeyPart::Id(organization_id), KeyPart::Limit(limit)],
        )
    }

    pub fn document(document_id: Uuid) -> Self {
        Self::new(Collection::Document, vec![KeyPart::Id(document_id)])
    }

    pub fn document_activities(organization_id: Uuid, limit: usize) -> Self {
        Self::new(
            Collection::DocumentActivities,
            vec![KeyPart::Id(organization_id), KeyPart::Limit(limit)],
        )
    }

    pub fn document_timeline(document_id: Uuid) -> Self {
        Self::new(Collection::DocumentTimeline, vec![KeyPart::Id(document_id)])
    }

    pub fn user_profile(user_id: Uuid) -> Self {
        Self::new(Collection::UserProfile, vec![KeyPart::Id(user_id)])
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }

    /// Leading id part (organization, document or user the key is scoped by).
    pub fn scope_id(&self) -> Option<Uuid> {
        match self.parts.first() {
            Some(KeyPart::Id(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.parts.iter().find_map(|part| match part {
            KeyPart::Limit(limit) => Some(*limit),
            KeyPart::Id(_) => None,
        })
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[\"{}\"", self.collection.as_str())?;
        for part in &self.parts {
            write!(f, ", {}", part)?;
        }
        write!(f, "]")
    }
}

/// Matches every key of a collection whose parts start with the given parts,
/// so `documents(org)` covers every paginated window of that organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPrefix {
    collection: Collection,
    parts: Vec<KeyPart>,
}

impl KeyPrefix {
    pub fn collection(collection: Collection) -> Self {
        Self {
            collection,
            parts: Vec::new(),
        }
    }

    pub fn with(mut self, part: KeyPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn documents_of(organization_id: Uuid) -> Self {
        Self::collection(Collection::Documents).with(KeyPart::Id(organization_id))
    }

    pub fn document(document_id: Uuid) -> Self {
        Self::collection(Collection::Document).with(KeyPart::Id(document_id))
    }

    pub fn activities_of(organization_id: Uuid) -> Self {
        Self::collection(Collection::DocumentActivities).with(KeyPart::Id(organization_id))
    }

    pub fn timeline_of(document_id: Uuid) -> Self {
        Self::collection(Collection::DocumentTimeline).with(KeyPart::Id(document_id))
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        key.collection == self.collection && key.parts.starts_with(&self.parts)
    }
}

impl From<&QueryKey> for KeyPrefix {
    fn from(key: &QueryKey) -> Self {
        Self {
            collection: key.collection,
            parts: key.parts.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_covers_paginated_windows() {
        let org = Uuid::new_v4();
        let prefix = KeyPrefix::documents_of(org);

        assert!(prefix.matches(&QueryKey::documents(org, 10)));
        assert!(prefix.matches(&QueryKey::documents(org, 50)));
        assert!(!prefix.matches(&QueryKey::documents(Uuid::new_v4(), 10)));
        assert!(!prefix.matches(&QueryKey::document_activities(org, 10)));
        assert!(KeyPrefix::collection(Collection::Documents).matches(&QueryKey::documents(org, 5)));
    }

    #[test]
    fn test_key_display_and_accessors() {
        let org = Uuid::nil();
        let key = QueryKey::documents(org, 10);
        assert_eq!(
            key.to_string(),
            "[\"documents\", \"00000000-0000-0000-0000-000000000000\", 10]"
        );
        assert_eq!(key.scope_id(), Some(org));
        assert_eq!(key.limit(), Some(10));
        assert_eq!(QueryKey::document(org).limit(), None);
    }
}
