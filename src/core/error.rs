use thiserror::Error;

#[derive(Error, Debug)]
pub enum ColabError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: String, id: String },

    #[error("{entity} already exists: {detail}")]
    AlreadyExists { entity: String, detail: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

impl ColabError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Precondition failures abort before any optimistic patch is applied.
    pub fn is_precondition(&self) -> bool {
        matches!(self, ColabError::Unauthorized(_) | ColabError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, ColabError>;

impl From<serde_json::Error> for ColabError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ColabError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_classification() {
        assert!(ColabError::Unauthorized("no profile".into()).is_precondition());
        assert!(!ColabError::Remote("timeout".into()).is_precondition());
    }

    #[test]
    fn test_not_found_message() {
        let err = ColabError::not_found("Document", "abc");
        assert_eq!(err.to_string(), "Document 'abc' not found");
    }
}
