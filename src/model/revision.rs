use super::Record;
use crate::core::{ColabError, Result};
use crate::remote::Table;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Review status of a revision.
///
/// State transitions:
/// ```text
/// PENDING ──accept──> ACCEPTED
///    │
///    └──reject──> REJECTED
/// ```
/// Both outcomes are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevisionStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RevisionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RevisionStatus::Accepted | RevisionStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionStatus::Pending => "PENDING",
            RevisionStatus::Accepted => "ACCEPTED",
            RevisionStatus::Rejected => "REJECTED",
        }
    }

    /// Validates a transition to `next`, returning the new status.
    pub fn transition(self, next: RevisionStatus) -> Result<RevisionStatus> {
        match (self, next) {
            (RevisionStatus::Pending, RevisionStatus::Accepted)
            | (RevisionStatus::Pending, RevisionStatus::Rejected) => Ok(next),
            (from, to) => Err(ColabError::InvalidTransition(format!(
                "revision cannot move from {} to {}",
                from, to
            ))),
        }
    }
}

impl std::fmt::Display for RevisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposed change to a document's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub id: Uuid,
    pub document_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub status: RevisionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Revision {
    const TABLE: Table = Table::Revision;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_transitions() {
        assert_eq!(
            RevisionStatus::Pending.transition(RevisionStatus::Accepted).unwrap(),
            RevisionStatus::Accepted
        );
        assert_eq!(
            RevisionStatus::Pending.transition(RevisionStatus::Rejected).unwrap(),
            RevisionStatus::Rejected
        );
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        for terminal in [RevisionStatus::Accepted, RevisionStatus::Rejected] {
            assert!(terminal.is_terminal());
            for next in [
                RevisionStatus::Pending,
                RevisionStatus::Accepted,
                RevisionStatus::Rejected,
            ] {
                assert!(matches!(
                    terminal.transition(next),
                    Err(ColabError::InvalidTransition(_))
                ));
            }
        }
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_value(RevisionStatus::Accepted).unwrap();
        assert_eq!(json, serde_json::json!("ACCEPTED"));
    }
}
