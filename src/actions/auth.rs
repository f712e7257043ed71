use crate::core::{ColabError, Result};
use crate::model::{Organization, Profile};
use crate::remote::{Filter, RemoteStore, find_by_id, find_one, insert_op};
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{Level, event};
use uuid::Uuid;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s").unwrap();
}

/// Organization slug: lowercase, each whitespace character replaced by `-`.
pub fn slugify(name: &str) -> String {
    WHITESPACE
        .replace_all(&name.trim().to_lowercase(), "-")
        .into_owned()
}

/// A freshly authenticated identity joining (or founding) an organization.
#[derive(Debug, Clone)]
pub struct SignupRequest {
    pub user_id: Uuid,
    pub email: String,
    pub organization_name: String,
}

/// Creates the profile for a new identity.
///
/// The organization is looked up by slug and created on first use. If another
/// signup creates the same organization concurrently, the existing one is
/// joined instead.
pub async fn signup(store: &dyn RemoteStore, request: SignupRequest) -> Result<Profile> {
    let email = request.email.trim();
    if email.is_empty() {
        return Err(ColabError::Validation("email is required".into()));
    }
    let slug = slugify(&request.organization_name);
    if slug.is_empty() {
        return Err(ColabError::Validation("organization name is required".into()));
    }
    if find_by_id::<Profile>(store, request.user_id).await?.is_some() {
        return Err(ColabError::AlreadyExists {
            entity: "Profile".into(),
            detail: format!("id {}", request.user_id),
        });
    }

    let organization = find_or_create_organization(store, request.organization_name.trim(), &slug).await?;

    let now = Utc::now();
    let profile = Profile {
        id: request.user_id,
        email: email.to_string(),
        organization_id: organization.id,
        created_at: now,
        updated_at: now,
    };
    store.batch(vec![insert_op(&profile)?]).await?;
    event!(
        Level::INFO,
        user = %profile.id,
        organization = %organization.slug,
        "profile created"
    );
    Ok(profile)
}

async fn find_or_create_organization(
    store: &dyn RemoteStore,
    name: &str,
    slug: &str,
) -> Result<Organization> {
    let by_slug = || Filter::new().eq("slug", slug);
    if let Some(existing) = find_one::<Organization>(store, by_slug()).await? {
        return Ok(existing);
    }

    let now = Utc::now();
    let organization = Organization {
        id: Uuid::new_v4(),
        name: name.to_string(),
        slug: slug.to_string(),
        created_at: now,
        updated_at: now,
    };
    match store.batch(vec![insert_op(&organization)?]).await {
        Ok(_) => {
            event!(Level::INFO, organization = %slug, "organization created");
            Ok(organization)
        }
        Err(ColabError::AlreadyExists { .. }) => find_one::<Organization>(store, by_slug())
            .await?
            .ok_or_else(|| ColabError::not_found("Organization", slug)),
        Err(err) => Err(err),
    }
}

/// Resolves an authenticated identity to its profile, if it has one.
pub async fn resolve_profile(store: &dyn RemoteStore, user_id: Uuid) -> Result<Option<Profile>> {
    find_by_id::<Profile>(store, user_id).await
}

/// Like [`resolve_profile`] but treats a missing profile as unauthorized.
pub async fn require_profile(store: &dyn RemoteStore, user_id: Uuid) -> Result<Profile> {
    resolve_profile(store, user_id)
        .await?
        .ok_or_else(|| ColabError::Unauthorized(format!("no profile for user {}", user_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{InMemoryRemoteStore, Table};

    fn request(email: &str, organization: &str) -> SignupRequest {
        SignupRequest {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            organization_name: organization.to_string(),
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Acme Corp"), "acme-corp");
        assert_eq!(slugify("  Big  Co "), "big--co");
        assert_eq!(slugify("solo"), "solo");
    }

    #[tokio::test]
    async fn test_signup_reuses_organization_by_slug() {
        let store = InMemoryRemoteStore::new();
        let alice = signup(&store, request("alice@acme.test", "Acme Corp")).await.unwrap();
        let bob = signup(&store, request("bob@acme.test", "acme corp")).await.unwrap();

        assert_eq!(alice.organization_id, bob.organization_id);
        assert_eq!(store.row_count(Table::Organization).await, 1);
        assert_eq!(store.row_count(Table::Profile).await, 2);
    }

    #[tokio::test]
    async fn test_signup_twice_fails() {
        let store = InMemoryRemoteStore::new();
        let first = request("alice@acme.test", "Acme");
        signup(&store, first.clone()).await.unwrap();

        let err = signup(&store, first).await.unwrap_err();
        assert!(matches!(err, ColabError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_require_profile_unknown_user() {
        let store = InMemoryRemoteStore::new();
        let err = require_profile(&store, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ColabError::Unauthorized(_)));
    }
}
