//! The per-session correction ledger.
//!
//! Like the entity aggregate, a [`CorrectionLedger`] is never changed in
//! place: `with_*` methods validate their input first and only then build a
//! successor. A failed call leaves nothing half-recorded.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parley_core::constants::DEFAULT_CONFIDENCE;
use parley_core::errors::{require_message_id, require_non_empty};
use parley_core::{Confidence, MessageId, Result, SessionId, ValidationError};
use parley_entities::{AdditiveSlot, SingleSlot, Slot};
use tracing::debug;

/// Who asked for a correction, when, and how sure we are.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrectionMetadata {
    /// When the correction was recorded.
    pub timestamp: DateTime<Utc>,
    /// Message carrying the user's correction.
    pub source_message_id: MessageId,
    /// Confidence that the message really is a correction.
    pub confidence: Confidence,
    /// Free-text reason, if one was given.
    pub reason: Option<String>,
}

/// A value the user asked to drop from an additive slot.
#[derive(Clone, Debug, PartialEq)]
pub struct RemovalRecord {
    /// The removed value, trimmed.
    pub entity_value: String,
    /// Audit metadata.
    pub metadata: CorrectionMetadata,
}

/// The latest correction of a single-valued slot.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrectionRecord {
    /// Value the user supplied.
    pub new_value: String,
    /// Value it replaced, when one was known.
    pub previous_value: Option<String>,
    /// Audit metadata.
    pub metadata: CorrectionMetadata,
}

/// Provenance for one ledger update. Confidence defaults to 0.9.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrectionContext {
    /// Message carrying the correction.
    pub source_message_id: MessageId,
    /// Confidence (validated when the update is applied).
    pub confidence: f64,
    /// Optional reason.
    pub reason: Option<String>,
    /// Fixed record time; `None` means now.
    pub timestamp: Option<DateTime<Utc>>,
}

impl CorrectionContext {
    /// Context with the default confidence and no reason.
    pub fn new(source_message_id: impl Into<MessageId>) -> Self {
        Self {
            source_message_id: source_message_id.into(),
            confidence: DEFAULT_CONFIDENCE,
            reason: None,
            timestamp: None,
        }
    }

    /// Set the confidence.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Attach a reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Pin the record time.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Validate and resolve into record metadata.
    pub fn metadata(&self) -> Result<CorrectionMetadata> {
        require_message_id(&self.source_message_id)?;
        let confidence = Confidence::new(self.confidence)?;
        Ok(CorrectionMetadata {
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            source_message_id: self.source_message_id.clone(),
            confidence,
            reason: self
                .reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_owned),
        })
    }
}

/// Raw material for [`CorrectionLedger::create`].
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerParts {
    /// Removals per additive slot, oldest first.
    pub removals: BTreeMap<AdditiveSlot, Vec<RemovalRecord>>,
    /// Latest correction per single-valued slot.
    pub corrections: BTreeMap<SingleSlot, CorrectionRecord>,
    /// Removal and correction calls so far; negative values are rejected.
    pub total_corrections: i64,
    /// Ledger creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last recorded call.
    pub last_updated: DateTime<Utc>,
}

impl Default for LedgerParts {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            removals: BTreeMap::new(),
            corrections: BTreeMap::new(),
            total_corrections: 0,
            created_at: now,
            last_updated: now,
        }
    }
}

/// Removals and corrections for one session.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrectionLedger {
    session_id: SessionId,
    removals: BTreeMap<AdditiveSlot, Vec<RemovalRecord>>,
    corrections: BTreeMap<SingleSlot, CorrectionRecord>,
    total_corrections: u64,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl CorrectionLedger {
    /// Open a ledger, optionally seeded with existing records.
    ///
    /// Fails on a blank session id, a negative counter, or any record with a
    /// blank value or message id.
    pub fn create(session_id: impl Into<SessionId>, initial: Option<LedgerParts>) -> Result<Self> {
        let session_id = session_id.into();
        if session_id.is_blank() {
            return Err(ValidationError::EmptySessionId);
        }
        let parts = initial.unwrap_or_default();
        let total_corrections = u64::try_from(parts.total_corrections).map_err(|_| {
            ValidationError::NegativeCounter {
                field: "totalCorrections",
                value: parts.total_corrections,
            }
        })?;

        for record in parts.removals.values().flatten() {
            require_non_empty("entityValue", &record.entity_value)?;
            require_message_id(&record.metadata.source_message_id)?;
        }
        for record in parts.corrections.values() {
            require_non_empty("newValue", &record.new_value)?;
            if let Some(previous) = &record.previous_value {
                require_non_empty("previousValue", previous)?;
            }
            require_message_id(&record.metadata.source_message_id)?;
        }

        let mut removals = parts.removals;
        removals.retain(|_, list| !list.is_empty());

        Ok(Self {
            session_id,
            removals,
            corrections: parts.corrections,
            total_corrections,
            created_at: parts.created_at,
            last_updated: parts.last_updated,
        })
    }

    /// An empty ledger for an id the caller has already checked.
    pub(crate) fn empty(session_id: SessionId, at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            removals: BTreeMap::new(),
            corrections: BTreeMap::new(),
            total_corrections: 0,
            created_at: at,
            last_updated: at,
        }
    }

    /// Decompose into parts (the inverse of [`create`](Self::create)).
    #[must_use]
    pub fn to_parts(&self) -> LedgerParts {
        LedgerParts {
            removals: self.removals.clone(),
            corrections: self.corrections.clone(),
            total_corrections: i64::try_from(self.total_corrections).unwrap_or(i64::MAX),
            created_at: self.created_at,
            last_updated: self.last_updated,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// Owning session.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Removals recorded for an additive slot, oldest first.
    #[must_use]
    pub fn removals(&self, slot: AdditiveSlot) -> &[RemovalRecord] {
        self.removals.get(&slot).map_or(&[], Vec::as_slice)
    }

    /// Latest correction of a single-valued slot.
    #[must_use]
    pub fn correction(&self, slot: impl Into<SingleSlot>) -> Option<&CorrectionRecord> {
        self.corrections.get(&slot.into())
    }

    /// Number of removal and correction calls recorded.
    #[must_use]
    pub fn total_corrections(&self) -> u64 {
        self.total_corrections
    }

    /// Ledger creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time of the last recorded call.
    #[must_use]
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    // ── Mutators (return a successor) ───────────────────────────────────

    /// Record that `value` was removed from an additive slot.
    ///
    /// Single-valued slots are corrected, not removed from, and are rejected
    /// with [`ValidationError::WrongSlotCategory`].
    pub fn with_removed_entity(
        &self,
        slot: impl Into<Slot>,
        value: &str,
        ctx: &CorrectionContext,
    ) -> Result<Self> {
        let slot = match slot.into() {
            Slot::Additive(slot) => slot,
            Slot::Single(single) => {
                return Err(ValidationError::WrongSlotCategory {
                    slot: single.key(),
                    operation: "removal",
                });
            }
        };
        require_non_empty("entityValue", value)?;
        let metadata = ctx.metadata()?;

        let mut next = self.clone();
        next.last_updated = metadata.timestamp;
        next.removals.entry(slot).or_default().push(RemovalRecord {
            entity_value: value.trim().to_owned(),
            metadata,
        });
        next.total_corrections = next.total_corrections.saturating_add(1);
        debug!(session_id = %self.session_id, slot = slot.key(), "removal recorded");
        Ok(next)
    }

    /// Record a correction of a single-valued slot, replacing any earlier one.
    ///
    /// Additive slots are rejected with [`ValidationError::WrongSlotCategory`].
    /// A blank `previous_value` is treated as unknown.
    pub fn with_corrected_entity(
        &self,
        slot: impl Into<Slot>,
        new_value: &str,
        previous_value: Option<&str>,
        ctx: &CorrectionContext,
    ) -> Result<Self> {
        let slot = match slot.into() {
            Slot::Single(slot) => slot,
            Slot::Additive(additive) => {
                return Err(ValidationError::WrongSlotCategory {
                    slot: additive.key(),
                    operation: "correction",
                });
            }
        };
        require_non_empty("newValue", new_value)?;
        let metadata = ctx.metadata()?;

        let mut next = self.clone();
        next.last_updated = metadata.timestamp;
        let replaced = next.corrections.insert(
            slot,
            CorrectionRecord {
                new_value: new_value.trim().to_owned(),
                previous_value: previous_value
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_owned),
                metadata,
            },
        );
        next.total_corrections = next.total_corrections.saturating_add(1);
        debug!(
            session_id = %self.session_id,
            slot = slot.key(),
            replaced = replaced.is_some(),
            "correction recorded"
        );
        Ok(next)
    }

    // ── Read-only queries ───────────────────────────────────────────────

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_corrections == 0
    }

    /// Whether any removal is on record.
    #[must_use]
    pub fn has_removals(&self) -> bool {
        self.removals.values().any(|list| !list.is_empty())
    }

    /// Whether any correction is on record.
    #[must_use]
    pub fn has_corrections(&self) -> bool {
        !self.corrections.is_empty()
    }

    /// Human-readable lines: removal counts per slot, then corrections.
    ///
    /// For example `"2 decision maker(s) removed"` or `"Budget corrected to $200K"`.
    #[must_use]
    pub fn correction_summary(&self) -> Vec<String> {
        let removals = AdditiveSlot::ALL.into_iter().filter_map(|slot| {
            let n = self.removals(slot).len();
            (n > 0).then(|| format!("{n} {}(s) removed", slot.noun()))
        });
        let corrections = SingleSlot::all().filter_map(|slot| {
            self.correction(slot)
                .map(|record| format!("{} corrected to {}", slot.label(), record.new_value))
        });
        removals.chain(corrections).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use parley_entities::{ConfidenceSlot, ReplaceableSlot};

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 14, minute, 0).unwrap()
    }

    fn ctx(msg: &str) -> CorrectionContext {
        CorrectionContext::new(msg).at(t(0))
    }

    fn ledger() -> CorrectionLedger {
        CorrectionLedger::create("sess-1", None).unwrap()
    }

    #[test]
    fn new_ledger_is_empty() {
        let ledger = ledger();
        assert!(ledger.is_empty());
        assert!(!ledger.has_removals());
        assert!(!ledger.has_corrections());
        assert!(ledger.correction_summary().is_empty());
        assert_eq!(ledger.session_id().as_str(), "sess-1");
    }

    #[test]
    fn blank_session_id_rejected() {
        assert_matches!(
            CorrectionLedger::create("  ", None),
            Err(ValidationError::EmptySessionId)
        );
    }

    #[test]
    fn scenario_correction_keeps_both_values() {
        let ledger = ledger()
            .with_corrected_entity(ReplaceableSlot::Budget, "$200K", Some("$100K"), &ctx("m7"))
            .unwrap();
        assert_eq!(ledger.total_corrections(), 1);
        let record = ledger.correction(ReplaceableSlot::Budget).unwrap();
        assert_eq!(record.new_value, "$200K");
        assert_eq!(record.previous_value.as_deref(), Some("$100K"));
        assert_eq!(record.metadata.source_message_id.as_str(), "m7");
        assert_eq!(ledger.correction_summary(), vec!["Budget corrected to $200K"]);
    }

    #[test]
    fn repeated_correction_replaces_but_still_counts() {
        let ledger = ledger()
            .with_corrected_entity(ConfidenceSlot::VisitorName, "Jon", None, &ctx("m1"))
            .unwrap()
            .with_corrected_entity(ConfidenceSlot::VisitorName, "John", Some("Jon"), &ctx("m2"))
            .unwrap();
        assert_eq!(ledger.total_corrections(), 2);
        assert_eq!(ledger.correction(ConfidenceSlot::VisitorName).unwrap().new_value, "John");
        assert_eq!(ledger.correction_summary(), vec!["Name corrected to John"]);
    }

    #[test]
    fn removals_append_trimmed_values() {
        let ledger = ledger()
            .with_removed_entity(AdditiveSlot::DecisionMakers, "  Bob  ", &ctx("m1"))
            .unwrap()
            .with_removed_entity(AdditiveSlot::DecisionMakers, "Carol", &ctx("m2").with_reason("left company"))
            .unwrap();
        let removed = ledger.removals(AdditiveSlot::DecisionMakers);
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].entity_value, "Bob");
        assert_eq!(removed[1].metadata.reason.as_deref(), Some("left company"));
        assert!(ledger.has_removals());
        assert_eq!(ledger.total_corrections(), 2);
    }

    #[test]
    fn summary_lists_removals_before_corrections() {
        let ledger = ledger()
            .with_corrected_entity(ReplaceableSlot::Timeline, "Q4", Some("Q3"), &ctx("m1"))
            .unwrap()
            .with_removed_entity(AdditiveSlot::PainPoints, "Churn", &ctx("m2"))
            .unwrap()
            .with_removed_entity(AdditiveSlot::DecisionMakers, "Bob", &ctx("m3"))
            .unwrap()
            .with_removed_entity(AdditiveSlot::DecisionMakers, "Alice", &ctx("m4"))
            .unwrap();
        assert_eq!(
            ledger.correction_summary(),
            vec![
                "2 decision maker(s) removed",
                "1 pain point(s) removed",
                "Timeline corrected to Q4",
            ]
        );
    }

    #[test]
    fn validation_happens_before_building() {
        let base = ledger();
        assert_matches!(
            base.with_removed_entity(AdditiveSlot::Goals, "   ", &ctx("m1")),
            Err(ValidationError::EmptyValue { field: "entityValue" })
        );
        assert_matches!(
            base.with_removed_entity(AdditiveSlot::Goals, "Grow", &ctx(" ")),
            Err(ValidationError::EmptyMessageId)
        );
        assert_matches!(
            base.with_corrected_entity(ReplaceableSlot::Budget, "$1", None, &ctx("m1").with_confidence(1.5)),
            Err(ValidationError::ConfidenceOutOfRange { .. })
        );
        assert!(base.is_empty());
    }

    #[test]
    fn slot_category_is_enforced() {
        let base = ledger();
        assert_matches!(
            base.with_removed_entity(ReplaceableSlot::Budget, "$1", &ctx("m1")),
            Err(ValidationError::WrongSlotCategory {
                slot: "budget",
                operation: "removal"
            })
        );
        assert_matches!(
            base.with_corrected_entity(AdditiveSlot::Goals, "Grow", None, &ctx("m1")),
            Err(ValidationError::WrongSlotCategory { slot: "goals", .. })
        );
    }

    #[test]
    fn mutators_leave_receiver_untouched() {
        let base = ledger();
        let snapshot = base.clone();
        let _next = base
            .with_removed_entity(AdditiveSlot::Goals, "Grow", &ctx("m1"))
            .unwrap();
        assert_eq!(base, snapshot);
    }

    #[test]
    fn blank_reason_and_previous_value_are_dropped() {
        let ledger = ledger()
            .with_corrected_entity(ReplaceableSlot::Urgency, "high", Some("  "), &ctx("m1").with_reason(" "))
            .unwrap();
        let record = ledger.correction(ReplaceableSlot::Urgency).unwrap();
        assert_eq!(record.previous_value, None);
        assert_eq!(record.metadata.reason, None);
    }

    #[test]
    fn create_validates_seed_records() {
        let metadata = ctx("m1").metadata().unwrap();
        let mut parts = LedgerParts::default();
        let _ = parts.corrections.insert(
            ReplaceableSlot::Budget.into(),
            CorrectionRecord {
                new_value: " ".into(),
                previous_value: None,
                metadata,
            },
        );
        assert_matches!(
            CorrectionLedger::create("s", Some(parts)),
            Err(ValidationError::EmptyValue { field: "newValue" })
        );

        let negative = LedgerParts {
            total_corrections: -4,
            ..LedgerParts::default()
        };
        assert_matches!(
            CorrectionLedger::create("s", Some(negative)),
            Err(ValidationError::NegativeCounter { field: "totalCorrections", .. })
        );
    }

    #[test]
    fn parts_round_trip() {
        let ledger = ledger()
            .with_removed_entity(AdditiveSlot::Goals, "Grow", &ctx("m1"))
            .unwrap()
            .with_corrected_entity(ConfidenceSlot::Company, "Acme", None, &ctx("m2"))
            .unwrap();
        let rebuilt = CorrectionLedger::create("sess-1", Some(ledger.to_parts())).unwrap();
        assert_eq!(rebuilt, ledger);
    }
}
