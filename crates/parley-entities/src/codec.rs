//! Persisted-record codec for [`EntityAggregate`].
//!
//! Encoding is exact: every slot is present (empty array or `null`) and every
//! date is an ISO-8601 UTC string. Decoding never fails. Legacy bare strings
//! are upgraded, missing fields fall back to defaults, a single unreadable
//! entity is dropped without losing its neighbours, and each of these is
//! reported in [`Decoded::warnings`].
//!
//! The record carries the normalization its additive slots were deduplicated
//! under, so a reload re-checks them against the same equality.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parley_core::constants::{LEGACY_CONFIDENCE, LEGACY_SOURCE_MESSAGE_ID};
use parley_core::decode::{
    StoredEntry, WarningSink, decode_confidence, decode_counter, decode_source_id, decode_text,
    decode_timestamp, format_timestamp,
};
use parley_core::{CodecWarningKind, Confidence, Decoded, NormalizeOptions};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::aggregate::{AggregateParts, EntityAggregate};
use crate::merge::dedupe_by_normalized;
use crate::slots::{AdditiveSlot, SingleSlot};
use crate::value::EntityValue;

/// Field holding the submitted-value counter.
pub const TOTAL_EXTRACTIONS_FIELD: &str = "totalExtractions";
/// Pre-rename spelling of [`TOTAL_EXTRACTIONS_FIELD`].
pub const LEGACY_TOTAL_EXTRACTIONS_FIELD: &str = "extractionCount";
/// Field holding the normalization used for deduplication.
pub const NORMALIZATION_FIELD: &str = "normalization";

/// One entity as persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    /// Stored value.
    pub value: String,
    /// ISO-8601 extraction time.
    pub extracted_at: String,
    /// Extractor confidence.
    pub confidence: f64,
    /// Source message.
    pub source_message_id: String,
}

impl EntityRecord {
    fn encode(entity: &EntityValue<String>) -> Self {
        Self {
            value: entity.value().clone(),
            extracted_at: format_timestamp(&entity.extracted_at()),
            confidence: entity.confidence().get(),
            source_message_id: entity.source_message_id().to_string(),
        }
    }
}

/// The aggregate as persisted: one field per slot plus bookkeeping.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRecord {
    /// Additive slots by key; every slot present.
    #[serde(flatten)]
    pub additive: BTreeMap<&'static str, Vec<EntityRecord>>,
    /// Single-valued slots by key; every slot present, `null` when unset.
    #[serde(flatten)]
    pub single: BTreeMap<&'static str, Option<EntityRecord>>,
    /// ISO-8601 time of the last update.
    pub last_updated: String,
    /// Submitted-value counter.
    pub total_extractions: u64,
    /// Equality the additive slots are deduplicated under.
    pub normalization: NormalizeOptions,
}

/// Encode an aggregate built under the default normalization.
#[must_use]
pub fn serialize(aggregate: &EntityAggregate) -> AggregateRecord {
    serialize_with(aggregate, &NormalizeOptions::default())
}

/// Encode an aggregate whose additive slots were merged under `options`.
#[must_use]
pub fn serialize_with(aggregate: &EntityAggregate, options: &NormalizeOptions) -> AggregateRecord {
    AggregateRecord {
        additive: AdditiveSlot::ALL
            .into_iter()
            .map(|slot| {
                let list = aggregate.additive(slot).iter().map(EntityRecord::encode).collect();
                (slot.key(), list)
            })
            .collect(),
        single: SingleSlot::all()
            .map(|slot| (slot.key(), aggregate.single(slot).map(EntityRecord::encode)))
            .collect(),
        last_updated: format_timestamp(&aggregate.last_updated()),
        total_extractions: aggregate.total_extractions(),
        normalization: *options,
    }
}

/// Encode straight to JSON.
#[must_use]
pub fn to_json(aggregate: &EntityAggregate) -> Value {
    to_json_with(aggregate, &NormalizeOptions::default())
}

/// Encode straight to JSON, recording `options`.
#[must_use]
pub fn to_json_with(aggregate: &EntityAggregate, options: &NormalizeOptions) -> Value {
    // a record of strings, numbers and string-keyed maps always serializes
    serde_json::to_value(serialize_with(aggregate, options)).unwrap_or(Value::Null)
}

/// Decode with default normalization, substituting the current time where needed.
pub fn deserialize(raw: &Value) -> Decoded<EntityAggregate> {
    deserialize_with(raw, Utc::now(), &NormalizeOptions::default())
}

/// Decode with an explicit clock.
///
/// `options` is the fallback equality for records that predate the
/// `normalization` field; a record that names its own wins.
pub fn deserialize_with(
    raw: &Value,
    now: DateTime<Utc>,
    options: &NormalizeOptions,
) -> Decoded<EntityAggregate> {
    let mut sink = WarningSink::new();
    let Some(root) = raw.as_object() else {
        sink.push("$", CodecWarningKind::NotAnObject);
        return sink.finish(empty_at(now));
    };
    let options = &decode_normalization(root.get(NORMALIZATION_FIELD), *options, &mut sink);

    let mut parts = AggregateParts {
        last_updated: decode_timestamp(root.get("lastUpdated"), "lastUpdated", now, &mut sink),
        total_extractions: 0,
        ..AggregateParts::default()
    };
    let total = decode_counter(
        root,
        TOTAL_EXTRACTIONS_FIELD,
        LEGACY_TOTAL_EXTRACTIONS_FIELD,
        &mut sink,
    );
    parts.total_extractions = i64::try_from(total).unwrap_or(i64::MAX);

    for slot in AdditiveSlot::ALL {
        let list = decode_additive(root, slot, now, options, &mut sink);
        if !list.is_empty() {
            let _ = parts.additive.insert(slot, list);
        }
    }
    for slot in SingleSlot::all() {
        let key = slot.key();
        match root.get(key) {
            None | Some(Value::Null) => {}
            Some(Value::Array(_)) => sink.push(key, CodecWarningKind::UnexpectedShape),
            Some(value) => {
                if let Some(entity) = decode_entity(value, key, now, &mut sink) {
                    let _ = parts.single.insert(slot, entity);
                }
            }
        }
    }

    match EntityAggregate::from_parts(parts, options) {
        Ok(aggregate) => sink.finish(aggregate),
        Err(e) => {
            // unreachable in practice: decoding already enforces every invariant
            sink.push("$", CodecWarningKind::dropped(e.to_string()));
            sink.finish(empty_at(now))
        }
    }
}

fn empty_at(now: DateTime<Utc>) -> EntityAggregate {
    let parts = AggregateParts {
        last_updated: now,
        ..AggregateParts::default()
    };
    EntityAggregate::from_parts(parts, &NormalizeOptions::default()).unwrap_or_default()
}

fn decode_normalization(
    field: Option<&Value>,
    fallback: NormalizeOptions,
    sink: &mut WarningSink,
) -> NormalizeOptions {
    match field {
        None | Some(Value::Null) => fallback,
        Some(raw) => NormalizeOptions::deserialize(raw).unwrap_or_else(|_| {
            sink.push(NORMALIZATION_FIELD, CodecWarningKind::UnexpectedShape);
            fallback
        }),
    }
}

fn decode_additive(
    root: &Map<String, Value>,
    slot: AdditiveSlot,
    now: DateTime<Utc>,
    options: &NormalizeOptions,
    sink: &mut WarningSink,
) -> Vec<EntityValue<String>> {
    let key = slot.key();
    let decoded: Vec<_> = match root.get(key) {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| decode_entity(item, &format!("{key}[{i}]"), now, sink))
            .collect(),
        // a lone string where a list belongs: one legacy entry
        Some(value @ Value::String(_)) => decode_entity(value, key, now, sink).into_iter().collect(),
        Some(_) => {
            sink.push(key, CodecWarningKind::UnexpectedShape);
            return Vec::new();
        }
    };
    let before = decoded.len();
    let deduped = dedupe_by_normalized(decoded, options);
    if deduped.len() < before {
        sink.push(key, CodecWarningKind::DuplicateDropped);
    }
    deduped
}

fn decode_entity(
    raw: &Value,
    path: &str,
    now: DateTime<Utc>,
    sink: &mut WarningSink,
) -> Option<EntityValue<String>> {
    let entry = StoredEntry::classify(raw);
    if let Some(rejection) = entry.rejection() {
        sink.push(path, rejection);
        return None;
    }
    match entry {
        StoredEntry::Legacy(text) => {
            sink.push(path, CodecWarningKind::LegacyString);
            Some(EntityValue::new(
                text.trim().to_owned(),
                now,
                Confidence::clamped(LEGACY_CONFIDENCE, Confidence::ZERO),
                LEGACY_SOURCE_MESSAGE_ID,
            ))
        }
        StoredEntry::Structured(map) => {
            let Some(value) = decode_text(map.get("value"), &format!("{path}.value"), sink) else {
                sink.push(path, CodecWarningKind::dropped("missing or non-scalar value"));
                return None;
            };
            let extracted_at =
                decode_timestamp(map.get("extractedAt"), &format!("{path}.extractedAt"), now, sink);
            let confidence = decode_confidence(map.get("confidence"), &format!("{path}.confidence"), sink);
            let source =
                decode_source_id(map.get("sourceMessageId"), &format!("{path}.sourceMessageId"), sink);
            Some(EntityValue::new(value, extracted_at, confidence, source))
        }
        StoredEntry::Malformed(_) => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
