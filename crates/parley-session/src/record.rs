//! The persisted session envelope.

use chrono::{DateTime, Utc};
use parley_core::decode::WarningSink;
use parley_core::{CodecWarningKind, Decoded, NormalizeOptions, SessionId};
use parley_corrections::{LedgerRecord, codec as ledger_codec};
use parley_entities::codec::{self as entity_codec, AggregateRecord};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::context::ConversationContext;

/// A session as handed to storage.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Session id.
    pub session_id: String,
    /// Revision the snapshot descends from.
    pub revision: u64,
    /// Entity aggregate.
    pub entities: AggregateRecord,
    /// Correction ledger.
    pub corrections: LedgerRecord,
}

impl ConversationContext {
    /// Encode for storage, assuming default normalization.
    #[must_use]
    pub fn to_record(&self) -> SessionRecord {
        self.to_record_with(&NormalizeOptions::default())
    }

    /// Encode for storage, recording the normalization the entities were merged under.
    #[must_use]
    pub fn to_record_with(&self, options: &NormalizeOptions) -> SessionRecord {
        SessionRecord {
            session_id: self.session_id().to_string(),
            revision: self.revision(),
            entities: entity_codec::serialize_with(self.entities(), options),
            corrections: ledger_codec::serialize(self.corrections()),
        }
    }

    /// Decode a stored envelope for `session_id`. Never fails.
    pub fn from_record(session_id: &SessionId, raw: &Value) -> Decoded<Self> {
        Self::from_record_with(session_id, raw, Utc::now(), &NormalizeOptions::default())
    }

    /// Decode with an explicit clock and normalization.
    ///
    /// A missing or malformed part decodes to its empty default; warnings
    /// from each part are reported under `entities.` / `corrections.`.
    /// `options` only applies to entity records that do not name their own.
    pub fn from_record_with(
        session_id: &SessionId,
        raw: &Value,
        now: DateTime<Utc>,
        options: &NormalizeOptions,
    ) -> Decoded<Self> {
        let mut sink = WarningSink::new();
        let root = raw.as_object();
        if root.is_none() {
            sink.push("$", CodecWarningKind::NotAnObject);
        }
        let revision = match field(root, "revision") {
            Value::Null => 0,
            value => value.as_u64().unwrap_or_else(|| {
                sink.push("revision", CodecWarningKind::CounterReset);
                0
            }),
        };

        let entities = entity_codec::deserialize_with(field(root, "entities"), now, options);
        sink.absorb("entities", entities.warnings);
        let corrections = ledger_codec::deserialize_with(field(root, "corrections"), session_id, now);
        sink.absorb("corrections", corrections.warnings);

        sink.finish(Self::from_parts(
            corrections.value.session_id().clone(),
            entities.value,
            corrections.value,
            revision,
        ))
    }
}

static NULL: Value = Value::Null;

fn field<'a>(root: Option<&'a Map<String, Value>>, name: &str) -> &'a Value {
    root.and_then(|r| r.get(name)).unwrap_or(&NULL)
}
