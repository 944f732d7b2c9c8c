//! Settings type definitions.
//!
//! All types use camelCase JSON and `#[serde(default)]`, so a partial
//! settings file only needs the keys it overrides.

use parley_core::NormalizeOptions;
use parley_core::constants::{DEFAULT_CONFIDENCE, DEFAULT_CONFIDENCE_THRESHOLD};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParleySettings {
    /// Entity extraction and merge defaults.
    pub entities: EntitySettings,
    /// Token budget for a single model invocation.
    pub context_window: ContextWindowSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl ParleySettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.entities.validate()?;
        self.context_window.validate()
    }
}

/// Defaults applied when merging extracted entities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntitySettings {
    /// Confidence assumed when the extractor reports none.
    pub default_confidence: f64,
    /// Confidence an existing value must exceed to resist replacement.
    pub confidence_threshold: f64,
    /// Equality normalization for deduplication.
    pub normalization: NormalizeOptions,
}

impl Default for EntitySettings {
    fn default() -> Self {
        Self {
            default_confidence: DEFAULT_CONFIDENCE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            normalization: NormalizeOptions::default(),
        }
    }
}

impl EntitySettings {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("entities.defaultConfidence", self.default_confidence),
            ("entities.confidenceThreshold", self.confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SettingsError::ConfidenceOutOfRange { field: name, value });
            }
        }
        Ok(())
    }
}

/// Context window partition, in tokens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextWindowSettings {
    /// Total window for one model invocation.
    pub max_tokens: u32,
    /// Reserved for the system prompt.
    pub system_prompt_tokens: u32,
    /// Reserved for the model's response.
    pub response_reserved_tokens: u32,
    /// Reserved for the running conversation summary.
    pub summary_tokens: u32,
}

impl Default for ContextWindowSettings {
    fn default() -> Self {
        Self {
            max_tokens: 5000,
            system_prompt_tokens: 500,
            response_reserved_tokens: 1500,
            summary_tokens: 200,
        }
    }
}

impl ContextWindowSettings {
    /// Sum of every reservation.
    #[must_use]
    pub fn reserved_tokens(&self) -> u64 {
        u64::from(self.system_prompt_tokens)
            + u64::from(self.response_reserved_tokens)
            + u64::from(self.summary_tokens)
    }

    fn validate(&self) -> Result<()> {
        if self.reserved_tokens() > u64::from(self.max_tokens) {
            return Err(SettingsError::WindowOversubscribed {
                reserved: self.reserved_tokens(),
                max_tokens: self.max_tokens,
            });
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(ParleySettings::default()).unwrap();
        assert_eq!(json["contextWindow"]["maxTokens"], 5000);
        assert_eq!(json["contextWindow"]["responseReservedTokens"], 1500);
        assert_eq!(json["entities"]["normalization"]["stripPunctuation"], true);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: ParleySettings =
            serde_json::from_str(r#"{"contextWindow": {"maxTokens": 8000}}"#).unwrap();
        assert_eq!(settings.context_window.max_tokens, 8000);
        assert_eq!(settings.context_window.summary_tokens, 200);
        assert_eq!(settings.entities, EntitySettings::default());
    }

    #[test]
    fn oversubscribed_window_is_invalid() {
        let mut settings = ParleySettings::default();
        settings.context_window.max_tokens = 1000;
        assert_matches!(
            settings.validate(),
            Err(SettingsError::WindowOversubscribed {
                reserved: 2200,
                max_tokens: 1000
            })
        );
    }

    #[test]
    fn out_of_range_threshold_is_invalid() {
        let mut settings = ParleySettings::default();
        settings.entities.confidence_threshold = 1.2;
        assert_matches!(
            settings.validate(),
            Err(SettingsError::ConfidenceOutOfRange {
                field: "entities.confidenceThreshold",
                ..
            })
        );
    }

    #[test]
    fn reserved_tokens_sums_all_parts() {
        assert_eq!(ContextWindowSettings::default().reserved_tokens(), 2200);
    }
}
