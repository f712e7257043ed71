use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use colabdoc::actions::{self, DocumentChanges, NewDocument, NewRevision, SignupRequest};
use colabdoc::model::{DocumentsPage, Profile};
use colabdoc::mutation::CollectingNotifier;
use colabdoc::{ClientConfig, InMemoryRemoteStore, QueryKey, RemoteStore, Session, Table};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "colabdoc")]
#[command(about = "Collaborative document review client core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Populate an in-memory store and print what it holds
    Seed {
        #[arg(long, default_value = "Acme Corp")]
        organization: String,
        #[arg(long, default_value_t = 2)]
        users: usize,
        #[arg(long, default_value_t = 5)]
        documents: usize,
    },
    /// Two sessions editing one organization's documents concurrently
    Demo {
        #[arg(long, default_value = "Acme Corp")]
        organization: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("colabdoc=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Seed {
            organization,
            users,
            documents,
        } => seed(&organization, users, documents).await,
        Command::Demo { organization } => demo(&organization).await,
    }
}

async fn signup(store: &dyn RemoteStore, email: &str, organization: &str) -> Result<Profile> {
    actions::signup(
        store,
        SignupRequest {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            organization_name: organization.to_string(),
        },
    )
    .await
    .with_context(|| format!("signup of {} failed", email))
}

async fn seed(organization: &str, users: usize, documents: usize) -> Result<()> {
    if users == 0 {
        return Err(anyhow!("at least one user is required"));
    }
    let store = InMemoryRemoteStore::new();
    let mut profiles = Vec::with_capacity(users);
    for index in 0..users {
        let email = format!("user{}@{}.test", index + 1, actions::slugify(organization));
        profiles.push(signup(&store, &email, organization).await?);
    }

    for index in 0..documents {
        let author = &profiles[index % profiles.len()];
        let document = actions::create_document(
            &store,
            author,
            NewDocument {
                id: Uuid::new_v4(),
                title: format!("Document {}", index + 1),
                content: format!("Initial draft of document {}", index + 1),
            },
        )
        .await?;
        let reviewer = &profiles[(index + 1) % profiles.len()];
        actions::create_revision(
            &store,
            reviewer,
            NewRevision {
                id: Uuid::new_v4(),
                document_id: document.id,
                content: format!("Suggested rewrite of document {}", index + 1),
            },
        )
        .await?;
    }

    println!("Seeded organization '{}' ({})", organization, actions::slugify(organization));
    for table in Table::ALL {
        println!("  {:<18} {:>4} rows", table.name(), store.row_count(table).await);
    }
    Ok(())
}

async fn demo(organization: &str) -> Result<()> {
    let store = Arc::new(InMemoryRemoteStore::new());
    let remote: Arc<dyn RemoteStore> = store.clone();
    let alice = signup(remote.as_ref(), "alice@example.test", organization).await?;
    let bob = signup(remote.as_ref(), "bob@example.test", organization).await?;

    let config = ClientConfig::from_env()?;
    let page_size = config.page_size;
    let notifier = Arc::new(CollectingNotifier::new());
    let alice_session = Session::open(Arc::clone(&remote), alice.id, config.clone())
        .await?
        .with_notifier(notifier.clone());
    let bob_session = Session::open(Arc::clone(&remote), bob.id, config).await?;

    alice_session.queries()?.documents(page_size).await?;
    bob_session.queries()?.documents(page_size).await?;
    let bob_channel = bob_session.watch_organization().await?;
    let mut reconciled = bob_channel.outcomes();

    // Optimistic create, mirrored into Bob's cache by the change feed.
    let document_id = Uuid::new_v4();
    let handle = alice_session.mutations().create_document(NewDocument {
        id: document_id,
        title: "Quarterly plan".into(),
        content: "Goals for the next quarter".into(),
    })?;
    println!("alice sees {} document(s) before the write settles", visible(&alice_session, page_size)?);
    handle.wait().await?;
    while let Ok(event) = tokio::time::timeout(Duration::from_millis(200), reconciled.recv()).await {
        let event = event?;
        println!("bob reconciled {} on {}: {:?}", event.kind, event.table, event.outcome);
        if event.table == Table::Document {
            break;
        }
    }
    println!("bob sees {} document(s)", visible(&bob_session, page_size)?);

    // Bob removes the document; Alice, unaware, edits it and is rolled back.
    bob_session.mutations().delete_document(document_id)?.wait().await?;
    let handle = alice_session.mutations().update_document(DocumentChanges {
        id: document_id,
        title: "Quarterly plan (final)".into(),
        content: "Goals for the next quarter, agreed".into(),
    })?;
    println!("alice optimistically renamed: {}", title_of(&alice_session, page_size, document_id)?);
    if let Err(err) = handle.wait().await {
        println!("alice's update failed: {}", err);
    }
    println!("alice after rollback: {}", title_of(&alice_session, page_size, document_id)?);
    for notification in notifier.take() {
        println!("notification [{}]: {}", notification.kind, notification.message);
    }

    bob_channel.unsubscribe().await;
    Ok(())
}

fn visible(session: &Session, limit: usize) -> Result<usize> {
    let key = QueryKey::documents(session.require_actor()?.organization_id, limit);
    let page = session.queries()?.peek::<DocumentsPage>(&key)?;
    Ok(page.data.map_or(0, |page| page.documents.len()))
}

fn title_of(session: &Session, limit: usize, id: Uuid) -> Result<String> {
    let key = QueryKey::documents(session.require_actor()?.organization_id, limit);
    let page = session.queries()?.peek::<DocumentsPage>(&key)?;
    Ok(page
        .data
        .and_then(|page| page.documents.iter().find(|doc| doc.id == id).map(|doc| doc.title.clone()))
        .unwrap_or_else(|| "<not listed>".to_string()))
}
