//! Tolerant field decoding shared by the persisted-record codecs.
//!
//! Restoring a session must never fail: malformed or legacy fields degrade to
//! defaults. Each degradation is reported as a [`CodecWarning`] instead of
//! being dropped silently, and logged at `warn`.

use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::confidence::Confidence;
use crate::constants::{LEGACY_CONFIDENCE, UNKNOWN_SOURCE_MESSAGE_ID};

/// A decoded value together with everything that had to be patched up.
#[derive(Clone, Debug)]
pub struct Decoded<T> {
    /// The recovered value.
    pub value: T,
    /// Degradations applied while decoding, in encounter order.
    pub warnings: Vec<CodecWarning>,
}

impl<T> Decoded<T> {
    /// Whether decoding needed no fallbacks.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Discard the warnings.
    pub fn into_inner(self) -> T {
        self.value
    }
}

/// One degradation applied while decoding a persisted record.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodecWarning {
    /// JSON path of the offending field (e.g. `painPoints[2].confidence`).
    pub path: String,
    /// What was wrong and what was substituted.
    pub kind: CodecWarningKind,
}

/// Kinds of decoding degradation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum CodecWarningKind {
    /// The root was not an object; an empty value was substituted.
    NotAnObject,
    /// A slot held a shape it never legitimately holds; the slot was emptied.
    UnexpectedShape,
    /// A bare string was upgraded with legacy provenance.
    LegacyString,
    /// A timestamp was missing; the current time was substituted.
    MissingTimestamp,
    /// A timestamp could not be parsed; the current time was substituted.
    InvalidTimestamp,
    /// A confidence was missing or non-numeric; the legacy default was substituted.
    MissingConfidence,
    /// A confidence was outside `[0, 1]` and was clamped.
    ConfidenceClamped,
    /// A source message id was missing; `unknown` was substituted.
    MissingSourceMessageId,
    /// A whole entity was dropped.
    DroppedEntity {
        /// Why the entity could not be recovered.
        reason: String,
    },
    /// An entry collided with an earlier one after normalization and was dropped.
    DuplicateDropped,
    /// A counter was read from its legacy field name.
    LegacyCounterField {
        /// The legacy field that supplied the value.
        field: String,
    },
    /// A counter was missing or invalid and was reset to zero.
    CounterReset,
    /// The record named a different session than the one requested.
    SessionIdMismatch {
        /// Session id found in the record.
        stored: String,
    },
    /// A stored value carried surrounding whitespace, which was trimmed.
    ValueTrimmed,
}

impl CodecWarningKind {
    /// A [`DroppedEntity`](Self::DroppedEntity) with the given reason.
    pub fn dropped(reason: impl Into<String>) -> Self {
        Self::DroppedEntity {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CodecWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match &self.kind {
            CodecWarningKind::NotAnObject => "not an object, using empty default".to_owned(),
            CodecWarningKind::UnexpectedShape => "unexpected shape, slot emptied".to_owned(),
            CodecWarningKind::LegacyString => "legacy bare string upgraded".to_owned(),
            CodecWarningKind::MissingTimestamp => "missing timestamp, using now".to_owned(),
            CodecWarningKind::InvalidTimestamp => "unparseable timestamp, using now".to_owned(),
            CodecWarningKind::MissingConfidence => "missing confidence, using 0.5".to_owned(),
            CodecWarningKind::ConfidenceClamped => "confidence clamped into [0, 1]".to_owned(),
            CodecWarningKind::MissingSourceMessageId => "missing source message id".to_owned(),
            CodecWarningKind::DroppedEntity { reason } => format!("entity dropped: {reason}"),
            CodecWarningKind::DuplicateDropped => "duplicate entry dropped".to_owned(),
            CodecWarningKind::LegacyCounterField { field } => format!("counter read from {field}"),
            CodecWarningKind::CounterReset => "counter reset to 0".to_owned(),
            CodecWarningKind::SessionIdMismatch { stored } => {
                format!("record belongs to session {stored}, keeping requested id")
            }
            CodecWarningKind::ValueTrimmed => "surrounding whitespace trimmed".to_owned(),
        };
        write!(f, "{}: {what}", self.path)
    }
}

/// Collects warnings for one decode pass and logs each as it arrives.
#[derive(Debug, Default)]
pub struct WarningSink {
    warnings: Vec<CodecWarning>,
}

impl WarningSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning.
    pub fn push(&mut self, path: impl Into<String>, kind: CodecWarningKind) {
        let warning = CodecWarning {
            path: path.into(),
            kind,
        };
        tracing::warn!(%warning, "degraded persisted record");
        self.warnings.push(warning);
    }

    /// Adopt warnings from a nested decode, prefixing their paths with `prefix`.
    ///
    /// They were logged when first recorded and are not logged again.
    pub fn absorb(&mut self, prefix: &str, warnings: Vec<CodecWarning>) {
        self.warnings.extend(warnings.into_iter().map(|w| CodecWarning {
            path: if w.path == "$" {
                prefix.to_owned()
            } else {
                format!("{prefix}.{}", w.path)
            },
            kind: w.kind,
        }));
    }

    /// Wrap a value with the collected warnings.
    pub fn finish<T>(self, value: T) -> Decoded<T> {
        Decoded {
            value,
            warnings: self.warnings,
        }
    }
}

/// Render a timestamp the way persisted records store it (UTC, millisecond ISO-8601).
#[must_use]
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Read a timestamp field: RFC 3339 strings and epoch milliseconds are accepted.
pub fn decode_timestamp(
    field: Option<&Value>,
    path: &str,
    now: DateTime<Utc>,
    sink: &mut WarningSink,
) -> DateTime<Utc> {
    let parsed = match field {
        None | Some(Value::Null) => {
            sink.push(path, CodecWarningKind::MissingTimestamp);
            return now;
        }
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Some(_) => None,
    };
    parsed.unwrap_or_else(|| {
        sink.push(path, CodecWarningKind::InvalidTimestamp);
        now
    })
}

/// Read a confidence field, clamping out-of-range numbers.
pub fn decode_confidence(field: Option<&Value>, path: &str, sink: &mut WarningSink) -> Confidence {
    let legacy = Confidence::clamped(LEGACY_CONFIDENCE, Confidence::ZERO);
    let Some(raw) = field.and_then(Value::as_f64) else {
        sink.push(path, CodecWarningKind::MissingConfidence);
        return legacy;
    };
    match Confidence::new(raw) {
        Ok(confidence) => confidence,
        Err(_) => {
            sink.push(path, CodecWarningKind::ConfidenceClamped);
            Confidence::clamped(raw, legacy)
        }
    }
}

/// Read a source message id, substituting `unknown` when absent or blank.
pub fn decode_source_id(field: Option<&Value>, path: &str, sink: &mut WarningSink) -> String {
    match field.and_then(Value::as_str).map(str::trim) {
        Some(id) if !id.is_empty() => id.to_owned(),
        _ => {
            sink.push(path, CodecWarningKind::MissingSourceMessageId);
            UNKNOWN_SOURCE_MESSAGE_ID.to_owned()
        }
    }
}

/// Read a non-negative counter from `field`, falling back to `legacy_field`, then 0.
pub fn decode_counter(
    root: &Map<String, Value>,
    field: &str,
    legacy_field: &str,
    sink: &mut WarningSink,
) -> u64 {
    if let Some(n) = root.get(field).and_then(counter_value) {
        return n;
    }
    if let Some(n) = root.get(legacy_field).and_then(counter_value) {
        sink.push(
            field,
            CodecWarningKind::LegacyCounterField {
                field: legacy_field.to_owned(),
            },
        );
        return n;
    }
    // absent counters on fresh records are normal; only flag present-but-bad ones
    if root.get(field).is_some_and(|v| !v.is_null()) {
        sink.push(field, CodecWarningKind::CounterReset);
    }
    0
}

/// Read a scalar as trimmed text: strings pass through, numbers and booleans
/// are stringified. `None` for blanks and anything structured.
pub fn scalar_text(field: Option<&Value>) -> Option<String> {
    let text = match field? {
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Like [`scalar_text`], but reports a string that lost surrounding whitespace.
pub fn decode_text(field: Option<&Value>, path: &str, sink: &mut WarningSink) -> Option<String> {
    let text = scalar_text(field)?;
    if field.and_then(Value::as_str).is_some_and(|raw| raw.len() != text.len()) {
        sink.push(path, CodecWarningKind::ValueTrimmed);
    }
    Some(text)
}

/// Every shape a persisted entry has been seen in.
#[derive(Clone, Copy, Debug)]
pub enum StoredEntry<'a> {
    /// Bare string from a legacy list format.
    Legacy(&'a str),
    /// Structured object, possibly with missing fields.
    Structured(&'a Map<String, Value>),
    /// Anything else.
    Malformed(&'a Value),
}

impl<'a> StoredEntry<'a> {
    /// Sort a raw JSON entry into its shape.
    #[must_use]
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::String(s) => Self::Legacy(s),
            Value::Object(map) => Self::Structured(map),
            other => Self::Malformed(other),
        }
    }

    /// Warning for an entry that cannot be recovered as-is, if any.
    ///
    /// Blank legacy strings and non-object, non-string values are dropped.
    #[must_use]
    pub fn rejection(&self) -> Option<CodecWarningKind> {
        match self {
            Self::Legacy(text) if text.trim().is_empty() => {
                Some(CodecWarningKind::dropped("empty legacy string"))
            }
            Self::Malformed(other) => Some(CodecWarningKind::dropped(format!(
                "unexpected {}",
                json_kind(other)
            ))),
            Self::Legacy(_) | Self::Structured(_) => None,
        }
    }
}

/// JSON type name, for warning messages.
#[must_use]
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn counter_value(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|f| f.is_finite() && *f >= 0.0)
        .map(|f| f.floor() as u64)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
