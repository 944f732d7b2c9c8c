//! Merge strategies.
//!
//! Pure functions: each takes the current slot contents by reference and
//! returns new contents. Nothing here validates input values; the aggregate
//! checks them before calling in.

use chrono::{DateTime, Utc};
use parley_core::{Confidence, MessageId, NormalizeOptions, normalize};
use std::collections::HashSet;

use crate::value::EntityValue;

/// Provenance stamped onto every value a merge creates.
#[derive(Clone, Debug, PartialEq)]
pub struct MergeContext {
    /// Extractor confidence for the submitted values.
    pub confidence: Confidence,
    /// Extraction time.
    pub timestamp: DateTime<Utc>,
    /// Message the values came from.
    pub source_message_id: MessageId,
}

impl MergeContext {
    /// Context stamped with the current time.
    pub fn new(confidence: Confidence, source_message_id: impl Into<MessageId>) -> Self {
        Self {
            confidence,
            timestamp: Utc::now(),
            source_message_id: source_message_id.into(),
        }
    }

    /// Override the extraction time.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Wrap `value` with this context's provenance.
    pub fn entity<T>(&self, value: T) -> EntityValue<T> {
        EntityValue::new(
            value,
            self.timestamp,
            self.confidence,
            self.source_message_id.clone(),
        )
    }
}

/// Append `new_values` and drop later entries whose normalized form was seen earlier.
///
/// The first occurrence wins regardless of confidence, so the stored casing
/// is the one first submitted.
pub fn apply_additive<S: AsRef<str>>(
    existing: &[EntityValue<String>],
    new_values: &[S],
    ctx: &MergeContext,
    options: &NormalizeOptions,
) -> Vec<EntityValue<String>> {
    let combined = existing
        .iter()
        .cloned()
        .chain(new_values.iter().map(|v| ctx.entity(v.as_ref().to_owned())));
    dedupe_by_normalized(combined, options)
}

/// Keep the first entry for each normalized form, preserving order.
pub fn dedupe_by_normalized<I>(values: I, options: &NormalizeOptions) -> Vec<EntityValue<String>>
where
    I: IntoIterator<Item = EntityValue<String>>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(normalize(v.value(), options)))
        .collect()
}

/// Newest wins: build the new value, discarding any prior one unseen.
pub fn apply_replaceable<T>(new_value: T, ctx: &MergeContext) -> EntityValue<T> {
    ctx.entity(new_value)
}

/// Keep `existing` only when it is strictly more confident than the
/// candidate and strictly above `threshold`; otherwise take the candidate.
///
/// Equal confidences resolve to the candidate.
pub fn apply_confidence_based<T: Clone>(
    existing: Option<&EntityValue<T>>,
    new_value: T,
    ctx: &MergeContext,
    threshold: f64,
) -> EntityValue<T> {
    match existing {
        Some(current)
            if current.confidence() > ctx.confidence
                && current.confidence().get() > threshold =>
        {
            current.clone()
        }
        _ => ctx.entity(new_value),
    }
}

/// Drop every entry whose normalized form matches `value_to_remove`.
pub fn remove_from_additive(
    list: &[EntityValue<String>],
    value_to_remove: &str,
    options: &NormalizeOptions,
) -> Vec<EntityValue<String>> {
    let target = normalize(value_to_remove, options);
    list.iter()
        .filter(|v| normalize(v.value(), options) != target)
        .cloned()
        .collect()
}

/// A correction is always "latest wins", whatever the slot's usual category.
pub fn apply_correction<T>(new_value: T, ctx: &MergeContext) -> EntityValue<T> {
    apply_replaceable(new_value, ctx)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
