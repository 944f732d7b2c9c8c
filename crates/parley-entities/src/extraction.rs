//! Extraction inputs and the per-call context the aggregate merges with.

use chrono::{DateTime, Utc};
use parley_core::constants::{DEFAULT_CONFIDENCE, DEFAULT_CONFIDENCE_THRESHOLD};
use parley_core::errors::require_message_id;
use parley_core::{Confidence, MessageId, NormalizeOptions, Result, ValidationError};
use parley_settings::EntitySettings;
use serde::{Deserialize, Serialize};

use crate::merge::MergeContext;

/// Provenance and policy for one aggregate update.
///
/// Confidence and threshold default to 0.9 and 0.7; the timestamp defaults
/// to the moment the update is applied.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractionContext {
    /// Message the values came from.
    pub source_message_id: MessageId,
    /// Extractor confidence (validated when the update is applied).
    pub confidence: f64,
    /// Threshold for confidence-based slots.
    pub threshold: f64,
    /// Equality normalization for deduplication and removal.
    pub normalization: NormalizeOptions,
    /// Fixed extraction time; `None` means now.
    pub timestamp: Option<DateTime<Utc>>,
}

impl ExtractionContext {
    /// Context with compiled defaults.
    pub fn new(source_message_id: impl Into<MessageId>) -> Self {
        Self {
            source_message_id: source_message_id.into(),
            confidence: DEFAULT_CONFIDENCE,
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            normalization: NormalizeOptions::default(),
            timestamp: None,
        }
    }

    /// Context with defaults taken from settings.
    pub fn from_settings(source_message_id: impl Into<MessageId>, settings: &EntitySettings) -> Self {
        Self {
            source_message_id: source_message_id.into(),
            confidence: settings.default_confidence,
            threshold: settings.confidence_threshold,
            normalization: settings.normalization,
            timestamp: None,
        }
    }

    /// Set the extractor confidence.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Set the confidence-based threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the normalization options.
    #[must_use]
    pub fn with_normalization(mut self, normalization: NormalizeOptions) -> Self {
        self.normalization = normalization;
        self
    }

    /// Pin the extraction time.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Validate and resolve into the merge engine's context.
    pub fn merge_context(&self) -> Result<MergeContext> {
        require_message_id(&self.source_message_id)?;
        let confidence = Confidence::new(self.confidence)?;
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ValidationError::ConfidenceOutOfRange {
                value: self.threshold,
            });
        }
        let ctx = MergeContext::new(confidence, self.source_message_id.clone());
        Ok(match self.timestamp {
            Some(at) => ctx.at(at),
            None => ctx,
        })
    }
}

/// One value or several, as delivered by the extractor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractedValues {
    /// A single value.
    One(String),
    /// A list of values.
    Many(Vec<String>),
}

impl ExtractedValues {
    /// View as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::One(v) => std::slice::from_ref(v),
            Self::Many(vs) => vs,
        }
    }

    /// Number of submitted values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Whether nothing was submitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

/// Candidate values for one slot, produced per turn by the extraction step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionInput {
    /// Slot key (`painPoints`, `budget`, ...).
    pub slot_name: String,
    /// Extracted value(s).
    pub values: ExtractedValues,
    /// Extractor confidence.
    pub confidence: f64,
    /// Message the values came from.
    pub source_message_id: MessageId,
}

impl ExtractionInput {
    /// Merge context for this input, inheriting threshold and normalization from `base`.
    #[must_use]
    pub fn context(&self, base: &ExtractionContext) -> ExtractionContext {
        ExtractionContext {
            source_message_id: self.source_message_id.clone(),
            confidence: self.confidence,
            ..base.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    #[test]
    fn defaults() {
        let ctx = ExtractionContext::new("m1");
        assert!((ctx.confidence - 0.9).abs() < f64::EPSILON);
        assert!((ctx.threshold - 0.7).abs() < f64::EPSILON);
        assert!(ctx.timestamp.is_none());
    }

    #[test]
    fn from_settings_copies_policy() {
        let settings = EntitySettings {
            default_confidence: 0.6,
            confidence_threshold: 0.5,
            normalization: NormalizeOptions::none(),
        };
        let ctx = ExtractionContext::from_settings("m1", &settings);
        assert!((ctx.confidence - 0.6).abs() < f64::EPSILON);
        assert!((ctx.threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(ctx.normalization, NormalizeOptions::none());
    }

    #[test]
    fn merge_context_validates() {
        assert_matches!(
            ExtractionContext::new("m1").with_confidence(1.5).merge_context(),
            Err(ValidationError::ConfidenceOutOfRange { .. })
        );
        assert_matches!(
            ExtractionContext::new(" ").merge_context(),
            Err(ValidationError::EmptyMessageId)
        );
        assert_matches!(
            ExtractionContext::new("m1").with_threshold(-1.0).merge_context(),
            Err(ValidationError::ConfidenceOutOfRange { .. })
        );
    }

    #[test]
    fn merge_context_uses_pinned_time() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let ctx = ExtractionContext::new("m1").at(at).merge_context().unwrap();
        assert_eq!(ctx.timestamp, at);
    }

    #[test]
    fn input_accepts_string_or_array() {
        let one: ExtractionInput = serde_json::from_str(
            r#"{"slotName":"budget","values":"$10K","confidence":0.8,"sourceMessageId":"m1"}"#,
        )
        .unwrap();
        assert_eq!(one.values.as_slice(), ["$10K".to_owned()]);

        let many: ExtractionInput = serde_json::from_str(
            r#"{"slotName":"goals","values":["a","b"],"confidence":0.8,"sourceMessageId":"m1"}"#,
        )
        .unwrap();
        assert_eq!(many.values.len(), 2);
    }

    #[test]
    fn input_context_overrides_provenance() {
        let input = ExtractionInput {
            slot_name: "role".into(),
            values: ExtractedValues::One("CTO".into()),
            confidence: 0.4,
            source_message_id: "m5".into(),
        };
        let ctx = input.context(&ExtractionContext::new("base").with_threshold(0.2));
        assert_eq!(ctx.source_message_id.as_str(), "m5");
        assert!((ctx.confidence - 0.4).abs() < f64::EPSILON);
        assert!((ctx.threshold - 0.2).abs() < f64::EPSILON);
    }
}
