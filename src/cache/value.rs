use crate::model::{ActivityFeed, DocumentDetail, DocumentsPage, Profile};
use serde::Serialize;

/// A cached query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum CachedValue {
    DocumentsPage(DocumentsPage),
    DocumentDetail(DocumentDetail),
    ActivityFeed(ActivityFeed),
    Profile(Profile),
}

impl CachedValue {
    pub fn as_documents_page_mut(&mut self) -> Option<&mut DocumentsPage> {
        match self {
            CachedValue::DocumentsPage(page) => Some(page),
            _ => None,
        }
    }

    pub fn as_document_detail_mut(&mut self) -> Option<&mut DocumentDetail> {
        match self {
            CachedValue::DocumentDetail(detail) => Some(detail),
            _ => None,
        }
    }

    pub fn as_activity_feed_mut(&mut self) -> Option<&mut ActivityFeed> {
        match self {
            CachedValue::ActivityFeed(feed) => Some(feed),
            _ => None,
        }
    }
}

/// Typed access to one `CachedValue` variant.
pub trait CacheShape: Clone + Sized {
    fn from_cached(value: CachedValue) -> Option<Self>;

    fn into_cached(self) -> CachedValue;
}

macro_rules! cache_shape {
    ($ty:ty, $variant:ident) => {
        impl CacheShape for $ty {
            fn from_cached(value: CachedValue) -> Option<Self> {
                match value {
                    CachedValue::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn into_cached(self) -> CachedValue {
                CachedValue::$variant(self)
            }
        }
    };
}

cache_shape!(DocumentsPage, DocumentsPage);
cache_shape!(DocumentDetail, DocumentDetail);
cache_shape!(ActivityFeed, ActivityFeed);
cache_shape!(Profile, Profile);
