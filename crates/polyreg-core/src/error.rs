//! Error taxonomy shared by every backend.

use thiserror::Error;

use crate::types::{SessionId, TargetRef};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("invalid target type: {tag:?}")]
    InvalidTargetType { tag: String },

    #[error("no backing record for {target}")]
    UnknownBackingRecord { target: TargetRef },

    #[error("entity {target} is not registered")]
    UnknownEntity { target: TargetRef },

    #[error("entity {target} is already registered")]
    DuplicateEntity { target: TargetRef },

    #[error("session {id} already exists")]
    DuplicateSession { id: SessionId },

    #[error("session {id} not found")]
    NotFound { id: SessionId },

    /// Lock-wait timeout or lost connection. Nothing was applied.
    #[error("transient store error: {0}")]
    Transient(String),

    #[error("store error: {0}")]
    Storage(String),
}

impl RegistryError {
    /// Whether the caller may retry the same call unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(RegistryError::Transient("database is locked".into()).is_retryable());
        assert!(!RegistryError::Storage("disk I/O error".into()).is_retryable());
        assert!(
            !RegistryError::DuplicateEntity {
                target: TargetRef::bot("b1")
            }
            .is_retryable()
        );
        assert!(
            !RegistryError::NotFound {
                id: SessionId::new("s1")
            }
            .is_retryable()
        );
    }

    #[test]
    fn messages_name_the_key() {
        let err = RegistryError::UnknownEntity {
            target: TargetRef::user("u9"),
        };
        assert_eq!(err.to_string(), "entity user:u9 is not registered");

        let err = RegistryError::InvalidTargetType {
            tag: "guild".into(),
        };
        assert_eq!(err.to_string(), "invalid target type: \"guild\"");
    }
}
