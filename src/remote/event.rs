// ============================================================================
// Change Notifications
// ============================================================================
//
// Each payload shape is tied to its event kind: inserts carry only the new
// row, deletes only the old row, updates both.
//
// ============================================================================

use super::{Row, Table, row_id};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Insert => write!(f, "INSERT"),
            EventKind::Update => write!(f, "UPDATE"),
            EventKind::Delete => write!(f, "DELETE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeEvent {
    Insert { table: Table, new: Row },
    Update { table: Table, old: Row, new: Row },
    Delete { table: Table, old: Row },
}

impl ChangeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChangeEvent::Insert { .. } => EventKind::Insert,
            ChangeEvent::Update { .. } => EventKind::Update,
            ChangeEvent::Delete { .. } => EventKind::Delete,
        }
    }

    pub fn table(&self) -> Table {
        match self {
            ChangeEvent::Insert { table, .. }
            | ChangeEvent::Update { table, .. }
            | ChangeEvent::Delete { table, .. } => *table,
        }
    }

    /// Id of the affected row, taken from the new row when there is one.
    pub fn record_id(&self) -> Option<Uuid> {
        match self {
            ChangeEvent::Insert { new, .. } | ChangeEvent::Update { new, .. } => row_id(new),
            ChangeEvent::Delete { old, .. } => row_id(old),
        }
    }
}

/// Set of event kinds a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventKinds {
    insert: bool,
    update: bool,
    delete: bool,
}

impl EventKinds {
    pub const ALL: EventKinds = EventKinds {
        insert: true,
        update: true,
        delete: true,
    };

    pub const INSERT: EventKinds = EventKinds {
        insert: true,
        update: false,
        delete: false,
    };

    pub fn only(kinds: &[EventKind]) -> Self {
        let mut set = EventKinds {
            insert: false,
            update: false,
            delete: false,
        };
        for kind in kinds {
            match kind {
                EventKind::Insert => set.insert = true,
                EventKind::Update => set.update = true,
                EventKind::Delete => set.delete = true,
            }
        }
        set
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Insert => self.insert,
            EventKind::Update => self.update,
            EventKind::Delete => self.delete,
        }
    }
}

impl Default for EventKinds {
    fn default() -> Self {
        Self::ALL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_tagging() {
        let id = Uuid::new_v4();
        let event = ChangeEvent::Delete {
            table: Table::Document,
            old: json!({"id": id.to_string()}).as_object().cloned().unwrap(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "DELETE");
        assert_eq!(json["table"], "Document");
        assert_eq!(event.record_id(), Some(id));
    }

    #[test]
    fn test_event_kinds() {
        let kinds = EventKinds::only(&[EventKind::Update, EventKind::Delete]);
        assert!(!kinds.contains(EventKind::Insert));
        assert!(kinds.contains(EventKind::Delete));
        assert!(EventKinds::ALL.contains(EventKind::Insert));
    }
}
