//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why a settings file could not become a usable [`ParleySettings`](crate::ParleySettings).
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings file {}: {source}", path.display())]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// The settings file is not JSON, or holds a field of the wrong type.
    #[error("settings file {} is not valid: {source}", path.display())]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying JSON failure.
        source: serde_json::Error,
    },
    /// A confidence setting fell outside `[0, 1]`.
    #[error("{field} must be within [0, 1], got {value}")]
    ConfidenceOutOfRange {
        /// Dotted settings path, e.g. `entities.confidenceThreshold`.
        field: &'static str,
        /// Rejected value.
        value: f64,
    },
    /// The context window reservations leave less than nothing for messages.
    #[error("contextWindow reservations ({reserved}) exceed maxTokens ({max_tokens})")]
    WindowOversubscribed {
        /// System prompt, response and summary reservations combined.
        reserved: u64,
        /// Configured window size.
        max_tokens: u32,
    },
}

impl SettingsError {
    /// Whether the file itself was unusable, as opposed to a value in it.
    #[must_use]
    pub fn is_file_error(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::Parse { .. })
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
