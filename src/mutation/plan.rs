use crate::cache::CachePatch;

/// The cache patches a mutation applies before its write is issued.
#[derive(Debug, Default)]
pub struct OptimisticPlan {
    patches: Vec<CachePatch>,
}

impl OptimisticPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, patch: CachePatch) -> Self {
        self.patches.push(patch);
        self
    }

    pub fn with_all(mut self, patches: impl IntoIterator<Item = CachePatch>) -> Self {
        self.patches.extend(patches);
        self
    }

    pub fn patches(&self) -> &[CachePatch] {
        &self.patches
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    CreateDocument,
    UpdateDocument,
    DeleteDocument,
    CreateRevision,
    AcceptRevision,
    RejectRevision,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::CreateDocument => "create_document",
            MutationKind::UpdateDocument => "update_document",
            MutationKind::DeleteDocument => "delete_document",
            MutationKind::CreateRevision => "create_revision",
            MutationKind::AcceptRevision => "accept_revision",
            MutationKind::RejectRevision => "reject_revision",
        }
    }
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
