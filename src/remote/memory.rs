use super::{
    ChangeEvent, EventKinds, Filter, Query, RemoteStore, Row, Subscription, SubscriptionId, Table,
    WriteOp, row_id,
};
use crate::core::{ColabError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{RwLock, mpsc};
use tracing::{Level, event};

struct Subscriber {
    table: Table,
    filter: Filter,
    kinds: EventKinds,
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

impl Subscriber {
    fn wants(&self, change: &ChangeEvent) -> bool {
        if self.table != change.table() || !self.kinds.contains(change.kind()) {
            return false;
        }
        match change {
            ChangeEvent::Insert { new, .. } => self.filter.matches(new),
            ChangeEvent::Update { old, new, .. } => {
                self.filter.matches(new) || self.filter.matches(old)
            }
            ChangeEvent::Delete { old, .. } => self.filter.matches(old),
        }
    }
}

type SubscriberRegistry = Arc<Mutex<HashMap<SubscriptionId, Subscriber>>>;

/// In-process remote store.
///
/// Tables are plain row vectors behind one async lock. A batch stages copies
/// of the tables it touches and swaps them in only if every op succeeds;
/// change events are published after the swap, in op order.
pub struct InMemoryRemoteStore {
    tables: RwLock<HashMap<Table, Vec<Row>>>,
    subscribers: SubscriberRegistry,
    next_subscription: AtomicU64,
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Number of rows currently held in `table`.
    pub async fn row_count(&self, table: Table) -> usize {
        self.tables.read().await.get(&table).map_or(0, Vec::len)
    }

    /// Number of open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map_or(0, |registry| registry.len())
    }

    fn publish(&self, changes: Vec<ChangeEvent>) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut registry = self.subscribers.lock()?;
        let mut closed = Vec::new();
        for change in &changes {
            for (id, subscriber) in registry.iter() {
                if subscriber.wants(change) && subscriber.sender.send(change.clone()).is_err() {
                    closed.push(*id);
                }
            }
        }
        for id in closed {
            registry.remove(&id);
        }
        Ok(())
    }
}

fn staged_table<'a>(
    staged: &'a mut HashMap<Table, Vec<Row>>,
    committed: &HashMap<Table, Vec<Row>>,
    table: Table,
) -> &'a mut Vec<Row> {
    staged
        .entry(table)
        .or_insert_with(|| committed.get(&table).cloned().unwrap_or_default())
}

fn check_unique(rows: &[Row], row: &Row, table: Table, skip: Option<usize>) -> Result<()> {
    let id = row.get("id");
    for (index, existing) in rows.iter().enumerate() {
        if Some(index) == skip {
            continue;
        }
        if id.is_some() && existing.get("id") == id {
            return Err(ColabError::AlreadyExists {
                entity: table.to_string(),
                detail: format!("id {}", id.map(Value::to_string).unwrap_or_default()),
            });
        }
        for field in table.unique_fields() {
            let candidate = row.get(*field);
            if candidate.is_some_and(|value| !value.is_null()) && existing.get(*field) == candidate {
                return Err(ColabError::AlreadyExists {
                    entity: table.to_string(),
                    detail: format!("{} {}", field, candidate.map(Value::to_string).unwrap_or_default()),
                });
            }
        }
    }
    Ok(())
}

fn apply_op(
    staged: &mut HashMap<Table, Vec<Row>>,
    committed: &HashMap<Table, Vec<Row>>,
    op: WriteOp,
    changes: &mut Vec<ChangeEvent>,
    affected: &mut Vec<Row>,
) -> Result<()> {
    match op {
        WriteOp::Insert { table, row } => {
            if row_id(&row).is_none() {
                return Err(ColabError::Validation(format!(
                    "insert into {} requires a uuid 'id' column",
                    table
                )));
            }
            let rows = staged_table(staged, committed, table);
            check_unique(rows, &row, table, None)?;
            rows.push(row.clone());
            changes.push(ChangeEvent::Insert {
                table,
                new: row.clone(),
            });
            affected.push(row);
        }
        WriteOp::Update {
            table,
            matching,
            patch,
        } => {
            if table.is_append_only() {
                return Err(ColabError::Validation(format!("{} is append-only", table)));
            }
            let rows = staged_table(staged, committed, table);
            let hits: Vec<usize> = rows
                .iter()
                .enumerate()
                .filter(|(_, row)| matching.matches(row))
                .map(|(index, _)| index)
                .collect();
            let index = match hits.as_slice() {
                [index] => *index,
                [] => return Err(ColabError::not_found(table.name(), &matching)),
                _ => {
                    return Err(ColabError::Conflict(format!(
                        "update on {} matched {} rows for {}",
                        table,
                        hits.len(),
                        matching
                    )));
                }
            };
            let old = rows[index].clone();
            if let Some(new_id) = patch.get("id") {
                if old.get("id") != Some(new_id) {
                    return Err(ColabError::Validation(format!("cannot change id of {} row", table)));
                }
            }
            let mut new = old.clone();
            for (field, value) in patch {
                new.insert(field, value);
            }
            check_unique(rows, &new, table, Some(index))?;
            rows[index] = new.clone();
            changes.push(ChangeEvent::Update {
                table,
                old,
                new: new.clone(),
            });
            affected.push(new);
        }
        WriteOp::Delete { table, matching } => {
            if table.is_append_only() {
                return Err(ColabError::Validation(format!("{} is append-only", table)));
            }
            let rows = staged_table(staged, committed, table);
            let before = rows.len();
            let mut removed = Vec::new();
            rows.retain(|row| {
                if matching.matches(row) {
                    removed.push(row.clone());
                    false
                } else {
                    true
                }
            });
            if rows.len() == before {
                return Err(ColabError::not_found(table.name(), &matching));
            }
            for old in removed {
                changes.push(ChangeEvent::Delete {
                    table,
                    old: old.clone(),
                });
                affected.push(old);
            }
        }
    }
    Ok(())
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn query(&self, query: Query) -> Result<Vec<Row>> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&query.table)
            .map(|rows| query.execute(rows))
            .unwrap_or_default())
    }

    async fn batch(&self, ops: Vec<WriteOp>) -> Result<Vec<Row>> {
        let op_count = ops.len();
        let mut changes = Vec::with_capacity(op_count);
        let mut affected = Vec::with_capacity(op_count);
        {
            let mut tables = self.tables.write().await;
            let mut staged: HashMap<Table, Vec<Row>> = HashMap::new();
            for op in ops {
                let table = op.table();
                if let Err(err) = apply_op(&mut staged, &tables, op, &mut changes, &mut affected) {
                    event!(Level::DEBUG, table = %table, error = %err, "batch rejected");
                    return Err(err);
                }
            }
            for (table, rows) in staged {
                tables.insert(table, rows);
            }
        }
        event!(Level::TRACE, ops = op_count, events = changes.len(), "batch committed");
        self.publish(changes)?;
        Ok(affected)
    }

    async fn subscribe(
        &self,
        table: Table,
        filter: Filter,
        kinds: EventKinds,
    ) -> Result<Subscription> {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.lock()?.insert(
            id,
            Subscriber {
                table,
                filter,
                kinds,
                sender,
            },
        );
        event!(Level::DEBUG, subscription = %id, table = %table, "subscription opened");

        let registry = Arc::downgrade(&self.subscribers);
        Ok(Subscription::new(id, table, receiver, move |id| {
            if let Some(registry) = registry.upgrade() {
                if let Ok(mut registry) = registry.lock() {
                    registry.remove(&id);
                }
            }
            event!(Level::DEBUG, subscription = %id, "subscription closed");
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::EventKind;
    use serde_json::json;
    use uuid::Uuid;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn org_row(slug: &str) -> Row {
        row(json!({"id": Uuid::new_v4().to_string(), "name": slug, "slug": slug}))
    }

    #[tokio::test]
    async fn test_batch_is_atomic() {
        let store = InMemoryRemoteStore::new();
        store.insert(Table::Organization, vec![org_row("acme")]).await.unwrap();

        let result = store
            .batch(vec![
                WriteOp::Insert {
                    table: Table::Organization,
                    row: org_row("globex"),
                },
                WriteOp::Insert {
                    table: Table::Organization,
                    row: org_row("acme"),
                },
            ])
            .await;

        assert!(matches!(result, Err(ColabError::AlreadyExists { .. })));
        assert_eq!(store.row_count(Table::Organization).await, 1);
    }

    #[tokio::test]
    async fn test_update_merges_patch() {
        let store = InMemoryRemoteStore::new();
        let id = Uuid::new_v4();
        store
            .insert(
                Table::Document,
                vec![row(json!({"id": id.to_string(), "title": "Old", "content": "body"}))],
            )
            .await
            .unwrap();

        let updated = store
            .update(Table::Document, Filter::by_id(id), row(json!({"title": "New"})))
            .await
            .unwrap();
        assert_eq!(updated["title"], "New");
        assert_eq!(updated["content"], "body");

        let missing = store
            .update(Table::Document, Filter::by_id(Uuid::new_v4()), row(json!({"title": "x"})))
            .await;
        assert!(matches!(missing, Err(ColabError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_append_only_tables() {
        let store = InMemoryRemoteStore::new();
        let result = store
            .batch(vec![WriteOp::Delete {
                table: Table::DocumentActivity,
                matching: Filter::new(),
            }])
            .await;
        assert!(matches!(result, Err(ColabError::Validation(_))));
    }

    #[tokio::test]
    async fn test_subscription_routing_and_teardown() {
        let store = InMemoryRemoteStore::new();
        let org = Uuid::new_v4();
        let mut subscription = store
            .subscribe(
                Table::Document,
                Filter::new().eq("organizationId", org),
                EventKinds::ALL,
            )
            .await
            .unwrap();
        assert_eq!(store.subscriber_count(), 1);

        let ours = Uuid::new_v4();
        store
            .insert(
                Table::Document,
                vec![
                    row(json!({"id": Uuid::new_v4().to_string(), "organizationId": Uuid::new_v4().to_string()})),
                    row(json!({"id": ours.to_string(), "organizationId": org.to_string()})),
                ],
            )
            .await
            .unwrap();

        let delivered = subscription.next().await.unwrap();
        assert_eq!(delivered.kind(), EventKind::Insert);
        assert_eq!(delivered.record_id(), Some(ours));
        assert!(subscription.try_next().is_none());

        subscription.unsubscribe();
        assert_eq!(store.subscriber_count(), 0);
    }
}
