use crate::core::{ColabError, Result};
use crate::model::{
    Document, DocumentActionType, DocumentActivity, Profile, Record, Revision, RevisionActionType,
    RevisionActivity, RevisionStatus,
};
use crate::remote::{Filter, RemoteStore, Table, WriteOp, find_one, from_row, insert_op, to_row};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{Level, event};
use uuid::Uuid;

/// Revision bodies must be longer than this many characters.
pub const MIN_REVISION_CONTENT: usize = 6;

/// Ids are chosen by the caller so optimistic cache entries and the stored
/// row agree without waiting for the write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub id: Uuid,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChanges {
    pub id: Uuid,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRevision {
    pub id: Uuid,
    pub document_id: Uuid,
    pub content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentPatch<'a> {
    title: &'a str,
    content: &'a str,
    updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SoftDeletePatch {
    deleted_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusPatch {
    status: RevisionStatus,
    updated_at: DateTime<Utc>,
}

pub fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(ColabError::Validation("document title must not be empty".into()));
    }
    Ok(())
}

pub fn validate_revision_content(content: &str) -> Result<()> {
    if content.trim().chars().count() <= MIN_REVISION_CONTENT {
        return Err(ColabError::Validation(format!(
            "revision content must be longer than {} characters",
            MIN_REVISION_CONTENT
        )));
    }
    Ok(())
}

/// Live documents of the actor's organization.
fn document_scope(actor: &Profile, id: Uuid) -> Filter {
    Filter::by_id(id)
        .eq("organizationId", actor.organization_id)
        .is_null("deletedAt")
}

/// Loads a live document of the actor's organization.
pub async fn load_document(store: &dyn RemoteStore, actor: &Profile, id: Uuid) -> Result<Document> {
    find_one::<Document>(store, document_scope(actor, id))
        .await?
        .ok_or_else(|| ColabError::not_found("Document", id))
}

/// Loads a revision whose document belongs to the actor's organization.
pub async fn load_revision(store: &dyn RemoteStore, actor: &Profile, id: Uuid) -> Result<Revision> {
    let revision = find_one::<Revision>(store, Filter::by_id(id))
        .await?
        .ok_or_else(|| ColabError::not_found("Revision", id))?;
    match load_document(store, actor, revision.document_id).await {
        Ok(_) => Ok(revision),
        Err(ColabError::NotFound { .. }) => Err(ColabError::not_found("Revision", id)),
        Err(err) => Err(err),
    }
}

fn document_activity(
    actor: &Profile,
    document_id: Uuid,
    action_type: DocumentActionType,
    details: serde_json::Value,
    at: DateTime<Utc>,
) -> DocumentActivity {
    DocumentActivity {
        id: Uuid::new_v4(),
        action_type,
        actor_id: actor.id,
        document_id,
        organization_id: actor.organization_id,
        details,
        created_at: at,
    }
}

fn revision_activity(
    actor: &Profile,
    revision_id: Uuid,
    action_type: RevisionActionType,
    at: DateTime<Utc>,
) -> RevisionActivity {
    RevisionActivity {
        id: Uuid::new_v4(),
        action_type,
        actor_id: actor.id,
        revision_id,
        created_at: at,
    }
}

/// Runs `ops` and decodes the first affected row.
async fn write_first<T: Record>(store: &dyn RemoteStore, ops: Vec<WriteOp>) -> Result<T> {
    let row = store
        .batch(ops)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ColabError::Remote(format!("batch on {} returned no rows", T::TABLE)))?;
    from_row(row)
}

pub async fn create_document(
    store: &dyn RemoteStore,
    actor: &Profile,
    input: NewDocument,
) -> Result<Document> {
    validate_title(&input.title)?;
    let now = Utc::now();
    let document = Document {
        id: input.id,
        title: input.title,
        content: input.content,
        author_id: actor.id,
        organization_id: actor.organization_id,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    let activity = document_activity(
        actor,
        document.id,
        DocumentActionType::Created,
        json!({ "title": document.title }),
        now,
    );
    let document: Document = write_first(store, vec![insert_op(&document)?, insert_op(&activity)?]).await?;
    event!(Level::INFO, document = %document.id, actor = %actor.id, "document created");
    Ok(document)
}

pub async fn update_document(
    store: &dyn RemoteStore,
    actor: &Profile,
    changes: DocumentChanges,
) -> Result<Document> {
    validate_title(&changes.title)?;
    let now = Utc::now();
    let patch = to_row(&ContentPatch {
        title: &changes.title,
        content: &changes.content,
        updated_at: now,
    })?;
    let activity = document_activity(
        actor,
        changes.id,
        DocumentActionType::Updated,
        json!({ "title": changes.title }),
        now,
    );
    let ops = vec![
        WriteOp::Update {
            table: Table::Document,
            matching: document_scope(actor, changes.id),
            patch,
        },
        insert_op(&activity)?,
    ];
    let document: Document = write_first(store, ops).await.map_err(|err| scoped(err, "Document", changes.id))?;
    event!(Level::INFO, document = %document.id, actor = %actor.id, "document updated");
    Ok(document)
}

/// Soft delete: sets `deletedAt` and records a DELETED activity atomically.
pub async fn delete_document(store: &dyn RemoteStore, actor: &Profile, id: Uuid) -> Result<Document> {
    let now = Utc::now();
    let patch = to_row(&SoftDeletePatch {
        deleted_at: now,
        updated_at: now,
    })?;
    let activity = document_activity(actor, id, DocumentActionType::Deleted, json!({}), now);
    let ops = vec![
        WriteOp::Update {
            table: Table::Document,
            matching: document_scope(actor, id),
            patch,
        },
        insert_op(&activity)?,
    ];
    let document: Document = write_first(store, ops).await.map_err(|err| scoped(err, "Document", id))?;
    event!(Level::INFO, document = %document.id, actor = %actor.id, "document deleted");
    Ok(document)
}

pub async fn create_revision(
    store: &dyn RemoteStore,
    actor: &Profile,
    input: NewRevision,
) -> Result<Revision> {
    validate_revision_content(&input.content)?;
    load_document(store, actor, input.document_id).await?;
    let now = Utc::now();
    let revision = Revision {
        id: input.id,
        document_id: input.document_id,
        author_id: actor.id,
        content: input.content,
        status: RevisionStatus::Pending,
        created_at: now,
        updated_at: now,
    };
    let activity = revision_activity(actor, revision.id, RevisionActionType::Created, now);
    let revision: Revision = write_first(store, vec![insert_op(&revision)?, insert_op(&activity)?]).await?;
    event!(Level::INFO, revision = %revision.id, document = %revision.document_id, "revision created");
    Ok(revision)
}

pub async fn accept_revision(store: &dyn RemoteStore, actor: &Profile, id: Uuid) -> Result<Revision> {
    settle_revision(store, actor, id, RevisionStatus::Accepted).await
}

pub async fn reject_revision(store: &dyn RemoteStore, actor: &Profile, id: Uuid) -> Result<Revision> {
    settle_revision(store, actor, id, RevisionStatus::Rejected).await
}

/// Moves a PENDING revision to a terminal status.
///
/// The update is guarded on `status = PENDING`, so a concurrent settlement
/// that lands between the read and the write surfaces as `Conflict`.
async fn settle_revision(
    store: &dyn RemoteStore,
    actor: &Profile,
    id: Uuid,
    next: RevisionStatus,
) -> Result<Revision> {
    let current = load_revision(store, actor, id).await?;
    let next = current.status.transition(next)?;
    let action = match next {
        RevisionStatus::Accepted => RevisionActionType::Accepted,
        RevisionStatus::Rejected => RevisionActionType::Rejected,
        RevisionStatus::Pending => {
            return Err(ColabError::InvalidTransition("revision cannot return to PENDING".into()));
        }
    };
    let now = Utc::now();
    let ops = vec![
        WriteOp::Update {
            table: Table::Revision,
            matching: Filter::by_id(id).eq("status", RevisionStatus::Pending),
            patch: to_row(&StatusPatch {
                status: next,
                updated_at: now,
            })?,
        },
        insert_op(&revision_activity(actor, id, action, now))?,
    ];
    let revision: Revision = match write_first(store, ops).await {
        Ok(revision) => revision,
        Err(ColabError::NotFound { .. }) => {
            return Err(ColabError::Conflict(format!(
                "revision {} was settled concurrently",
                id
            )));
        }
        Err(err) => return Err(err),
    };
    event!(Level::INFO, revision = %id, status = %next, actor = %actor.id, "revision settled");
    Ok(revision)
}

/// Normalizes an out-of-scope match failure to the entity's own NotFound.
fn scoped(err: ColabError, entity: &str, id: Uuid) -> ColabError {
    match err {
        ColabError::NotFound { .. } => ColabError::not_found(entity, id),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_content_rule() {
        assert!(validate_revision_content("tiny").is_err());
        assert!(validate_revision_content("sixsix").is_err());
        assert!(validate_revision_content("seven!!").is_ok());
    }

    #[test]
    fn test_title_rule() {
        assert!(validate_title("   ").is_err());
        assert!(validate_title("Roadmap").is_ok());
    }
}
