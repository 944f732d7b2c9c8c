//! Session-layer errors.

use parley_core::{SessionId, ValidationError};
use thiserror::Error;

/// Text shown to end users whatever went wrong underneath.
pub const USER_MESSAGE: &str = "could not update context";

/// Storage failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer saved first.
    #[error("session {session_id} is at revision {actual}, expected {expected}")]
    Conflict {
        /// Session being written.
        session_id: SessionId,
        /// Revision the writer started from.
        expected: u64,
        /// Revision actually stored.
        actual: u64,
    },

    /// The record could not be encoded.
    #[error("failed to encode session record: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Anything that can stop a session update.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Storage refused the write.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.rule(),
            Self::Store(StoreError::Conflict { .. }) => "STORE_CONFLICT",
            Self::Store(StoreError::Serialization(_)) => "STORE_SERIALIZATION",
        }
    }

    /// Whether reloading and retrying may succeed.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict { .. }))
    }

    /// Generic text for the user-facing boundary; details stay in logs.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        USER_MESSAGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_user_message() {
        let validation = SessionError::from(ValidationError::EmptyMessageId);
        assert_eq!(validation.code(), "EMPTY_MESSAGE_ID");
        assert_eq!(validation.user_message(), "could not update context");
        assert!(!validation.is_conflict());

        let conflict = SessionError::from(StoreError::Conflict {
            session_id: "s1".into(),
            expected: 2,
            actual: 3,
        });
        assert_eq!(conflict.code(), "STORE_CONFLICT");
        assert!(conflict.is_conflict());
        assert_eq!(conflict.to_string(), "session s1 is at revision 3, expected 2");
        assert_eq!(conflict.user_message(), USER_MESSAGE);
    }
}
