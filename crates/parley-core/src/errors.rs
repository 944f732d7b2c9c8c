//! Validation errors for construction-time invariant checks.
//!
//! Every aggregate, ledger, and budget constructor in the workspace reports
//! a broken invariant through [`ValidationError`]. Deserialization never
//! produces these; it degrades to defaults instead.

use thiserror::Error;

/// A violated construction-time invariant.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ValidationError {
    /// A confidence score fell outside `[0, 1]` (or was NaN).
    #[error("confidence {value} is outside [0, 1]")]
    ConfidenceOutOfRange {
        /// The rejected value.
        value: f64,
    },

    /// A counter that must be non-negative was negative.
    #[error("{field} must be non-negative, got {value}")]
    NegativeCounter {
        /// Counter name.
        field: &'static str,
        /// The rejected value.
        value: i64,
    },

    /// A required value was empty after trimming.
    #[error("{field} must not be empty")]
    EmptyValue {
        /// Name of the empty field.
        field: &'static str,
    },

    /// The session identifier was empty.
    #[error("session id must not be empty")]
    EmptySessionId,

    /// The source message identifier was empty.
    #[error("source message id must not be empty")]
    EmptyMessageId,

    /// Two entries of an additive slot share a normalized form.
    #[error("slot {slot} holds duplicate entry {value:?}")]
    DuplicateAdditiveEntry {
        /// Slot key.
        slot: &'static str,
        /// The duplicated value as stored.
        value: String,
    },

    /// Reserved tokens exceed the context window.
    #[error("reserved tokens ({reserved}) exceed max tokens ({max_tokens})")]
    ReservedTokensExceedMax {
        /// Sum of system prompt, response and summary reservations.
        reserved: u64,
        /// Configured context window.
        max_tokens: u32,
    },

    /// A slot name did not match any known slot.
    #[error("unknown entity slot: {0}")]
    UnknownSlot(String),

    /// A slot was used with an operation its category does not support.
    #[error("slot {slot} does not accept {operation}")]
    WrongSlotCategory {
        /// Slot key.
        slot: &'static str,
        /// Operation that was attempted.
        operation: &'static str,
    },
}

impl ValidationError {
    /// Stable machine-readable code identifying the violated rule.
    #[must_use]
    pub fn rule(&self) -> &'static str {
        match self {
            Self::ConfidenceOutOfRange { .. } => "CONFIDENCE_OUT_OF_RANGE",
            Self::NegativeCounter { .. } => "NEGATIVE_COUNTER",
            Self::EmptyValue { .. } => "EMPTY_VALUE",
            Self::EmptySessionId => "EMPTY_SESSION_ID",
            Self::EmptyMessageId => "EMPTY_MESSAGE_ID",
            Self::DuplicateAdditiveEntry { .. } => "DUPLICATE_ADDITIVE_ENTRY",
            Self::ReservedTokensExceedMax { .. } => "RESERVED_TOKENS_EXCEED_MAX",
            Self::UnknownSlot(_) => "UNKNOWN_SLOT",
            Self::WrongSlotCategory { .. } => "WRONG_SLOT_CATEGORY",
        }
    }
}

/// Result type for validated construction.
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Reject a value that is empty after trimming.
pub fn require_non_empty(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyValue { field });
    }
    Ok(())
}

/// Reject an empty source message id.
pub fn require_message_id(message_id: &str) -> Result<()> {
    if message_id.trim().is_empty() {
        return Err(ValidationError::EmptyMessageId);
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn confidence_display() {
        let err = ValidationError::ConfidenceOutOfRange { value: 1.5 };
        assert_eq!(err.to_string(), "confidence 1.5 is outside [0, 1]");
        assert_eq!(err.rule(), "CONFIDENCE_OUT_OF_RANGE");
    }

    #[test]
    fn reserved_tokens_display() {
        let err = ValidationError::ReservedTokensExceedMax {
            reserved: 6000,
            max_tokens: 5000,
        };
        assert_eq!(
            err.to_string(),
            "reserved tokens (6000) exceed max tokens (5000)"
        );
    }

    #[test]
    fn require_non_empty_rejects_whitespace() {
        assert_matches!(
            require_non_empty("value", "   "),
            Err(ValidationError::EmptyValue { field: "value" })
        );
        assert!(require_non_empty("value", " x ").is_ok());
    }

    #[test]
    fn require_message_id_rejects_blank() {
        assert_eq!(require_message_id(""), Err(ValidationError::EmptyMessageId));
        assert!(require_message_id("msg-1").is_ok());
    }

    #[test]
    fn rules_are_distinct() {
        let errors = [
            ValidationError::EmptySessionId,
            ValidationError::EmptyMessageId,
            ValidationError::UnknownSlot("x".into()),
            ValidationError::NegativeCounter {
                field: "totalExtractions",
                value: -1,
            },
        ];
        let mut rules: Vec<_> = errors.iter().map(ValidationError::rule).collect();
        rules.sort_unstable();
        rules.dedup();
        assert_eq!(rules.len(), errors.len());
    }
}
