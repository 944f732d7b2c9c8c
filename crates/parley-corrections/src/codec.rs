//! Persisted-record codec for [`CorrectionLedger`].
//!
//! Same policy as the aggregate codec: encoding writes every slot (empty
//! array or `null`) with ISO-8601 UTC dates; decoding never fails and reports
//! each repair as a warning.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parley_core::constants::{LEGACY_CONFIDENCE, LEGACY_SOURCE_MESSAGE_ID};
use parley_core::decode::{
    StoredEntry, WarningSink, decode_confidence, decode_counter, decode_source_id, decode_text,
    decode_timestamp, format_timestamp,
};
use parley_core::{CodecWarningKind, Confidence, Decoded, SessionId};
use parley_entities::{AdditiveSlot, SingleSlot};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::ledger::{CorrectionLedger, CorrectionMetadata, CorrectionRecord, LedgerParts, RemovalRecord};

/// Field holding the call counter.
pub const TOTAL_CORRECTIONS_FIELD: &str = "totalCorrections";
/// Pre-rename spelling of [`TOTAL_CORRECTIONS_FIELD`].
pub const LEGACY_TOTAL_CORRECTIONS_FIELD: &str = "correctionCount";

/// Audit metadata as persisted.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEntry {
    /// ISO-8601 record time.
    pub timestamp: String,
    /// Message carrying the correction.
    pub source_message_id: String,
    /// Confidence.
    pub confidence: f64,
    /// Reason, `null` when none was given.
    pub reason: Option<String>,
}

/// One removal as persisted.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalEntry {
    /// Removed value.
    pub entity_value: String,
    /// Audit metadata.
    pub metadata: MetadataEntry,
}

/// One correction as persisted.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionEntry {
    /// Corrected value.
    pub new_value: String,
    /// Replaced value, `null` when unknown.
    pub previous_value: Option<String>,
    /// Audit metadata.
    pub metadata: MetadataEntry,
}

/// The ledger as persisted.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    /// Owning session.
    pub session_id: String,
    /// Removals per additive slot key; every slot present.
    pub removals: BTreeMap<&'static str, Vec<RemovalEntry>>,
    /// Corrections per single-valued slot key; every slot present.
    pub corrections: BTreeMap<&'static str, Option<CorrectionEntry>>,
    /// Removal and correction calls so far.
    pub total_corrections: u64,
    /// ISO-8601 creation time.
    pub created_at: String,
    /// ISO-8601 time of the last call.
    pub last_updated: String,
}

impl MetadataEntry {
    fn encode(metadata: &CorrectionMetadata) -> Self {
        Self {
            timestamp: format_timestamp(&metadata.timestamp),
            source_message_id: metadata.source_message_id.to_string(),
            confidence: metadata.confidence.get(),
            reason: metadata.reason.clone(),
        }
    }
}

/// Encode a ledger into its persisted shape.
#[must_use]
pub fn serialize(ledger: &CorrectionLedger) -> LedgerRecord {
    LedgerRecord {
        session_id: ledger.session_id().to_string(),
        removals: AdditiveSlot::ALL
            .into_iter()
            .map(|slot| {
                let entries = ledger
                    .removals(slot)
                    .iter()
                    .map(|r| RemovalEntry {
                        entity_value: r.entity_value.clone(),
                        metadata: MetadataEntry::encode(&r.metadata),
                    })
                    .collect();
                (slot.key(), entries)
            })
            .collect(),
        corrections: SingleSlot::all()
            .map(|slot| {
                let entry = ledger.correction(slot).map(|c| CorrectionEntry {
                    new_value: c.new_value.clone(),
                    previous_value: c.previous_value.clone(),
                    metadata: MetadataEntry::encode(&c.metadata),
                });
                (slot.key(), entry)
            })
            .collect(),
        total_corrections: ledger.total_corrections(),
        created_at: format_timestamp(&ledger.created_at()),
        last_updated: format_timestamp(&ledger.last_updated()),
    }
}

/// Encode straight to JSON.
#[must_use]
pub fn to_json(ledger: &CorrectionLedger) -> Value {
    serde_json::to_value(serialize(ledger)).unwrap_or(Value::Null)
}

/// Decode the ledger stored for `session_id`, substituting now where needed.
pub fn deserialize(raw: &Value, session_id: &SessionId) -> Decoded<CorrectionLedger> {
    deserialize_with(raw, session_id, Utc::now())
}

/// Decode with an explicit clock.
///
/// The requested `session_id` always wins; a record naming another session
/// is decoded anyway and flagged.
pub fn deserialize_with(
    raw: &Value,
    session_id: &SessionId,
    now: DateTime<Utc>,
) -> Decoded<CorrectionLedger> {
    let mut sink = WarningSink::new();
    let Some(root) = raw.as_object() else {
        sink.push("$", CodecWarningKind::NotAnObject);
        return sink.finish(empty_ledger(session_id, now));
    };

    if let Some(stored) = root
        .get("sessionId")
        .and_then(Value::as_str)
        .filter(|stored| *stored != session_id.as_str())
    {
        sink.push(
            "sessionId",
            CodecWarningKind::SessionIdMismatch {
                stored: stored.to_owned(),
            },
        );
    }

    let total = decode_counter(
        root,
        TOTAL_CORRECTIONS_FIELD,
        LEGACY_TOTAL_CORRECTIONS_FIELD,
        &mut sink,
    );
    let mut parts = LedgerParts {
        removals: BTreeMap::new(),
        corrections: BTreeMap::new(),
        total_corrections: i64::try_from(total).unwrap_or(i64::MAX),
        created_at: decode_timestamp(root.get("createdAt"), "createdAt", now, &mut sink),
        last_updated: decode_timestamp(root.get("lastUpdated"), "lastUpdated", now, &mut sink),
    };

    let removals = root.get("removals").and_then(Value::as_object);
    for slot in AdditiveSlot::ALL {
        let path = format!("removals.{}", slot.key());
        let entries = match removals.and_then(|m| m.get(slot.key())) {
            None | Some(Value::Null) => continue,
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| decode_removal(item, &format!("{path}[{i}]"), now, &mut sink))
                .collect::<Vec<_>>(),
            Some(_) => {
                sink.push(path, CodecWarningKind::UnexpectedShape);
                continue;
            }
        };
        if !entries.is_empty() {
            let _ = parts.removals.insert(slot, entries);
        }
    }

    let corrections = root.get("corrections").and_then(Value::as_object);
    for slot in SingleSlot::all() {
        let path = format!("corrections.{}", slot.key());
        match corrections.and_then(|m| m.get(slot.key())) {
            None | Some(Value::Null) => {}
            Some(Value::Array(_)) => sink.push(path, CodecWarningKind::UnexpectedShape),
            Some(value) => {
                if let Some(record) = decode_correction(value, &path, now, &mut sink) {
                    let _ = parts.corrections.insert(slot, record);
                }
            }
        }
    }

    match CorrectionLedger::create(session_id.clone(), Some(parts)) {
        Ok(ledger) => sink.finish(ledger),
        Err(e) => {
            sink.push("$", CodecWarningKind::dropped(e.to_string()));
            sink.finish(empty_ledger(session_id, now))
        }
    }
}

fn empty_ledger(session_id: &SessionId, now: DateTime<Utc>) -> CorrectionLedger {
    let session_id = if session_id.is_blank() {
        SessionId::new()
    } else {
        session_id.clone()
    };
    CorrectionLedger::empty(session_id, now)
}

fn legacy_metadata(now: DateTime<Utc>) -> CorrectionMetadata {
    CorrectionMetadata {
        timestamp: now,
        source_message_id: LEGACY_SOURCE_MESSAGE_ID.into(),
        confidence: Confidence::clamped(LEGACY_CONFIDENCE, Confidence::ZERO),
        reason: None,
    }
}

fn decode_metadata(
    raw: Option<&Value>,
    path: &str,
    now: DateTime<Utc>,
    sink: &mut WarningSink,
) -> CorrectionMetadata {
    let empty = Map::new();
    let map = raw.and_then(Value::as_object).unwrap_or(&empty);
    CorrectionMetadata {
        timestamp: decode_timestamp(map.get("timestamp"), &format!("{path}.timestamp"), now, sink),
        source_message_id: decode_source_id(
            map.get("sourceMessageId"),
            &format!("{path}.sourceMessageId"),
            sink,
        )
        .into(),
        confidence: decode_confidence(map.get("confidence"), &format!("{path}.confidence"), sink),
        reason: decode_text(map.get("reason"), &format!("{path}.reason"), sink),
    }
}

/// Shape-check a ledger entry, reporting it when it cannot be used at all.
fn usable_entry<'a>(raw: &'a Value, path: &str, sink: &mut WarningSink) -> Option<StoredEntry<'a>> {
    let entry = StoredEntry::classify(raw);
    match entry.rejection() {
        Some(rejection) => {
            sink.push(path, rejection);
            None
        }
        None => Some(entry),
    }
}

fn decode_removal(
    raw: &Value,
    path: &str,
    now: DateTime<Utc>,
    sink: &mut WarningSink,
) -> Option<RemovalRecord> {
    match usable_entry(raw, path, sink)? {
        StoredEntry::Legacy(text) => {
            sink.push(path, CodecWarningKind::LegacyString);
            Some(RemovalRecord {
                entity_value: text.trim().to_owned(),
                metadata: legacy_metadata(now),
            })
        }
        StoredEntry::Structured(map) => {
            let Some(entity_value) =
                decode_text(map.get("entityValue"), &format!("{path}.entityValue"), sink)
            else {
                sink.push(path, CodecWarningKind::dropped("missing or non-scalar entityValue"));
                return None;
            };
            Some(RemovalRecord {
                entity_value,
                metadata: decode_metadata(map.get("metadata"), &format!("{path}.metadata"), now, sink),
            })
        }
        StoredEntry::Malformed(_) => None,
    }
}

fn decode_correction(
    raw: &Value,
    path: &str,
    now: DateTime<Utc>,
    sink: &mut WarningSink,
) -> Option<CorrectionRecord> {
    match usable_entry(raw, path, sink)? {
        StoredEntry::Legacy(text) => {
            sink.push(path, CodecWarningKind::LegacyString);
            Some(CorrectionRecord {
                new_value: text.trim().to_owned(),
                previous_value: None,
                metadata: legacy_metadata(now),
            })
        }
        StoredEntry::Structured(map) => {
            let Some(new_value) = decode_text(map.get("newValue"), &format!("{path}.newValue"), sink) else {
                sink.push(path, CodecWarningKind::dropped("missing or non-scalar newValue"));
                return None;
            };
            Some(CorrectionRecord {
                new_value,
                previous_value: decode_text(
                    map.get("previousValue"),
                    &format!("{path}.previousValue"),
                    sink,
                ),
                metadata: decode_metadata(map.get("metadata"), &format!("{path}.metadata"), now, sink),
            })
        }
        StoredEntry::Malformed(_) => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
