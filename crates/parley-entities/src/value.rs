//! A single extracted value with its provenance.

use chrono::{DateTime, Utc};
use parley_core::{Confidence, MessageId, Result};

/// An extracted value, when it was extracted, how sure the extractor was,
/// and which message it came from.
///
/// Fields are private: a value in hand always carries a confidence in
/// `[0, 1]`, and nothing can change it after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityValue<T> {
    value: T,
    extracted_at: DateTime<Utc>,
    confidence: Confidence,
    source_message_id: MessageId,
}

impl<T> EntityValue<T> {
    /// Build from an already-validated confidence.
    pub fn new(
        value: T,
        extracted_at: DateTime<Utc>,
        confidence: Confidence,
        source_message_id: impl Into<MessageId>,
    ) -> Self {
        Self {
            value,
            extracted_at,
            confidence,
            source_message_id: source_message_id.into(),
        }
    }

    /// Build from a raw score, rejecting anything outside `[0, 1]`.
    pub fn try_new(
        value: T,
        extracted_at: DateTime<Utc>,
        confidence: f64,
        source_message_id: impl Into<MessageId>,
    ) -> Result<Self> {
        Ok(Self::new(
            value,
            extracted_at,
            Confidence::new(confidence)?,
            source_message_id,
        ))
    }

    /// The extracted value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// When the value was extracted.
    pub fn extracted_at(&self) -> DateTime<Utc> {
        self.extracted_at
    }

    /// Extractor confidence.
    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    /// Message the value was extracted from.
    pub fn source_message_id(&self) -> &MessageId {
        &self.source_message_id
    }

    /// Consume and return the inner value.
    pub fn into_value(self) -> T {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use parley_core::ValidationError;

    #[test]
    fn try_new_rejects_out_of_range() {
        assert_matches!(
            EntityValue::try_new("Acme", Utc::now(), 1.2, "m1"),
            Err(ValidationError::ConfidenceOutOfRange { .. })
        );
        assert_matches!(
            EntityValue::try_new("Acme", Utc::now(), -0.01, "m1"),
            Err(ValidationError::ConfidenceOutOfRange { .. })
        );
    }

    #[test]
    fn accessors_return_fields() {
        let at = Utc::now();
        let v = EntityValue::try_new(42_u32, at, 0.6, "m7").unwrap();
        assert_eq!(*v.value(), 42);
        assert_eq!(v.extracted_at(), at);
        assert!((v.confidence().get() - 0.6).abs() < f64::EPSILON);
        assert_eq!(v.source_message_id().as_str(), "m7");
        assert_eq!(v.into_value(), 42);
    }
}
