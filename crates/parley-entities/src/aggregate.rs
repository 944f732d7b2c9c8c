//! The per-session entity aggregate.
//!
//! [`EntityAggregate`] is an immutable value: every `with_*` method borrows
//! the current snapshot and returns a successor, so snapshots held elsewhere
//! never change underneath their holders.
//!
//! Two sessions never share an aggregate. Two writers racing on the same
//! snapshot will each produce a successor and the last one persisted wins;
//! serializing writes per session is the caller's job.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parley_core::errors::require_non_empty;
use parley_core::{NormalizeOptions, Result, ValidationError, normalize};
use serde::Serialize;
use tracing::debug;

use crate::extraction::{ExtractionContext, ExtractionInput};
use crate::merge::{self, MergeContext};
use crate::slots::{AdditiveSlot, ConfidenceSlot, ReplaceableSlot, SingleSlot, Slot};
use crate::value::EntityValue;

/// Raw material for [`EntityAggregate::from_parts`].
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateParts {
    /// Additive slot lists; missing slots are empty.
    pub additive: BTreeMap<AdditiveSlot, Vec<EntityValue<String>>>,
    /// Single-valued slots; missing slots are unset.
    pub single: BTreeMap<SingleSlot, EntityValue<String>>,
    /// Last modification time.
    pub last_updated: DateTime<Utc>,
    /// Submitted-value counter; negative values are rejected.
    pub total_extractions: i64,
}

impl Default for AggregateParts {
    fn default() -> Self {
        Self {
            additive: BTreeMap::new(),
            single: BTreeMap::new(),
            last_updated: Utc::now(),
            total_extractions: 0,
        }
    }
}

/// Every entity slot for one conversation session.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityAggregate {
    additive: BTreeMap<AdditiveSlot, Vec<EntityValue<String>>>,
    single: BTreeMap<SingleSlot, EntityValue<String>>,
    last_updated: DateTime<Utc>,
    total_extractions: u64,
}

/// Entry counts per merge category.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCounts {
    /// Entries across all additive slots.
    pub additive: usize,
    /// Filled replaceable slots.
    pub replaceable: usize,
    /// Filled confidence-based slots.
    pub confidence_based: usize,
}

impl CategoryCounts {
    /// Sum of all categories.
    #[must_use]
    pub fn total(&self) -> usize {
        self.additive + self.replaceable + self.confidence_based
    }
}

/// Flattened current value(s) of one slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SummaryValue {
    /// Additive slot contents.
    Many(Vec<String>),
    /// Single slot contents, `None` when unset.
    One(Option<String>),
}

impl Default for EntityAggregate {
    fn default() -> Self {
        Self::empty()
    }
}

impl EntityAggregate {
    /// An aggregate with no entities, stamped now.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            additive: BTreeMap::new(),
            single: BTreeMap::new(),
            last_updated: Utc::now(),
            total_extractions: 0,
        }
    }

    /// Build from parts, enforcing every invariant.
    ///
    /// Fails on a negative counter, an empty value, or two additive entries
    /// sharing a normalized form under `options`.
    pub fn from_parts(parts: AggregateParts, options: &NormalizeOptions) -> Result<Self> {
        let total_extractions = u64::try_from(parts.total_extractions).map_err(|_| {
            ValidationError::NegativeCounter {
                field: "totalExtractions",
                value: parts.total_extractions,
            }
        })?;

        for (slot, list) in &parts.additive {
            let mut seen = std::collections::HashSet::new();
            for entity in list {
                require_non_empty("value", entity.value())?;
                if !seen.insert(normalize(entity.value(), options)) {
                    return Err(ValidationError::DuplicateAdditiveEntry {
                        slot: slot.key(),
                        value: entity.value().clone(),
                    });
                }
            }
        }
        for entity in parts.single.values() {
            require_non_empty("value", entity.value())?;
        }

        let mut additive = parts.additive;
        additive.retain(|_, list| !list.is_empty());

        Ok(Self {
            additive,
            single: parts.single,
            last_updated: parts.last_updated,
            total_extractions,
        })
    }

    /// Decompose into parts (the inverse of [`from_parts`](Self::from_parts)).
    #[must_use]
    pub fn to_parts(&self) -> AggregateParts {
        AggregateParts {
            additive: self.additive.clone(),
            single: self.single.clone(),
            last_updated: self.last_updated,
            total_extractions: i64::try_from(self.total_extractions).unwrap_or(i64::MAX),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// Entries of an additive slot, in first-seen order.
    #[must_use]
    pub fn additive(&self, slot: AdditiveSlot) -> &[EntityValue<String>] {
        self.additive.get(&slot).map_or(&[], Vec::as_slice)
    }

    /// Value of a single-valued slot.
    #[must_use]
    pub fn single(&self, slot: impl Into<SingleSlot>) -> Option<&EntityValue<String>> {
        self.single.get(&slot.into())
    }

    /// Value of a replaceable slot.
    #[must_use]
    pub fn replaceable(&self, slot: ReplaceableSlot) -> Option<&EntityValue<String>> {
        self.single(slot)
    }

    /// Value of a confidence-based slot.
    #[must_use]
    pub fn confidence_based(&self, slot: ConfidenceSlot) -> Option<&EntityValue<String>> {
        self.single(slot)
    }

    /// Last modification time.
    #[must_use]
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Number of values ever submitted (not the number stored).
    #[must_use]
    pub fn total_extractions(&self) -> u64 {
        self.total_extractions
    }

    /// Whether nothing has ever been submitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_extractions == 0
    }

    /// Every stored entity with its slot, additive slots first.
    pub fn entities(&self) -> impl Iterator<Item = (Slot, &EntityValue<String>)> {
        let additive = self
            .additive
            .iter()
            .flat_map(|(slot, list)| list.iter().map(move |v| (Slot::Additive(*slot), v)));
        let single = self.single.iter().map(|(slot, v)| (Slot::Single(*slot), v));
        additive.chain(single)
    }

    // ── Mutators (return a successor) ───────────────────────────────────

    /// Merge values into an additive slot.
    ///
    /// Values are stored trimmed. The counter grows by `values.len()`,
    /// including values dropped as duplicates.
    pub fn with_additive<S: AsRef<str>>(
        &self,
        slot: AdditiveSlot,
        values: &[S],
        ctx: &ExtractionContext,
    ) -> Result<Self> {
        let merge_ctx = ctx.merge_context()?;
        let values: Vec<&str> = values.iter().map(|v| v.as_ref().trim()).collect();
        for value in &values {
            require_non_empty("value", value)?;
        }
        let merged = merge::apply_additive(self.additive(slot), &values, &merge_ctx, &ctx.normalization);
        debug!(
            slot = slot.key(),
            submitted = values.len(),
            stored = merged.len(),
            "additive merge"
        );
        let mut next = self.clone();
        next.set_additive(slot, merged);
        Ok(next.touched(&merge_ctx, values.len()))
    }

    /// Replace a replaceable slot unconditionally.
    pub fn with_replaceable(
        &self,
        slot: ReplaceableSlot,
        value: impl Into<String>,
        ctx: &ExtractionContext,
    ) -> Result<Self> {
        let value = trimmed(value.into());
        let merge_ctx = ctx.merge_context()?;
        require_non_empty("value", &value)?;
        let mut next = self.clone();
        let _ = next
            .single
            .insert(slot.into(), merge::apply_replaceable(value, &merge_ctx));
        Ok(next.touched(&merge_ctx, 1))
    }

    /// Offer a value to a confidence-based slot.
    ///
    /// The counter grows by one even when the existing value is retained.
    pub fn with_confidence_based(
        &self,
        slot: ConfidenceSlot,
        value: impl Into<String>,
        ctx: &ExtractionContext,
    ) -> Result<Self> {
        let value = trimmed(value.into());
        let merge_ctx = ctx.merge_context()?;
        require_non_empty("value", &value)?;
        let resolved = merge::apply_confidence_based(
            self.confidence_based(slot),
            value,
            &merge_ctx,
            ctx.threshold,
        );
        debug!(
            slot = slot.key(),
            kept = %resolved.value(),
            confidence = %resolved.confidence(),
            "confidence-based merge"
        );
        let mut next = self.clone();
        let _ = next.single.insert(slot.into(), resolved);
        Ok(next.touched(&merge_ctx, 1))
    }

    /// Remove a value.
    ///
    /// Additive slots drop every normalized match; single slots are cleared
    /// when their value normalizes equal to `value`.
    pub fn with_removed(&self, slot: impl Into<Slot>, value: &str, ctx: &ExtractionContext) -> Result<Self> {
        let slot = slot.into();
        let merge_ctx = ctx.merge_context()?;
        require_non_empty("value", value)?;
        let mut next = self.clone();
        match slot {
            Slot::Additive(additive) => {
                let remaining =
                    merge::remove_from_additive(self.additive(additive), value, &ctx.normalization);
                next.set_additive(additive, remaining);
            }
            Slot::Single(single) => {
                let target = normalize(value, &ctx.normalization);
                if self
                    .single
                    .get(&single)
                    .is_some_and(|v| normalize(v.value(), &ctx.normalization) == target)
                {
                    let _ = next.single.remove(&single);
                }
            }
        }
        debug!(slot = slot.key(), value, "entity removed");
        Ok(next.touched(&merge_ctx, 1))
    }

    /// Apply a user correction: latest wins regardless of slot category.
    ///
    /// For additive slots the corrected entity replaces a normalized match
    /// in place, or is appended when nothing matches.
    pub fn with_corrected(
        &self,
        slot: impl Into<Slot>,
        value: impl Into<String>,
        ctx: &ExtractionContext,
    ) -> Result<Self> {
        let slot = slot.into();
        let value = trimmed(value.into());
        let merge_ctx = ctx.merge_context()?;
        require_non_empty("value", &value)?;
        let corrected = merge::apply_correction(value, &merge_ctx);
        let mut next = self.clone();
        match slot {
            Slot::Additive(additive) => {
                let target = normalize(corrected.value(), &ctx.normalization);
                let mut list = self.additive(additive).to_vec();
                match list
                    .iter()
                    .position(|v| normalize(v.value(), &ctx.normalization) == target)
                {
                    Some(index) => list[index] = corrected,
                    None => list.push(corrected),
                }
                next.set_additive(additive, list);
            }
            Slot::Single(single) => {
                let _ = next.single.insert(single, corrected);
            }
        }
        debug!(slot = slot.key(), "entity corrected");
        Ok(next.touched(&merge_ctx, 1))
    }

    /// Apply one extractor output, dispatching on the slot's category.
    ///
    /// Multiple values for a single-valued slot are applied in order.
    pub fn apply_extraction(&self, input: &ExtractionInput, base: &ExtractionContext) -> Result<Self> {
        let slot = Slot::parse(&input.slot_name)?;
        let ctx = input.context(base);
        let values = input.values.as_slice();
        match slot {
            Slot::Additive(additive) => self.with_additive(additive, values, &ctx),
            Slot::Single(SingleSlot::Replaceable(replaceable)) => values
                .iter()
                .try_fold(self.clone(), |agg, v| agg.with_replaceable(replaceable, v.clone(), &ctx)),
            Slot::Single(SingleSlot::ConfidenceBased(confidence)) => values
                .iter()
                .try_fold(self.clone(), |agg, v| agg.with_confidence_based(confidence, v.clone(), &ctx)),
        }
    }

    // ── Read-only queries ───────────────────────────────────────────────

    /// Current value(s) of every slot, keyed by slot key.
    #[must_use]
    pub fn summary(&self) -> BTreeMap<&'static str, SummaryValue> {
        Slot::all()
            .map(|slot| {
                let value = match slot {
                    Slot::Additive(s) => SummaryValue::Many(
                        self.additive(s).iter().map(|v| v.value().clone()).collect(),
                    ),
                    Slot::Single(s) => SummaryValue::One(self.single(s).map(|v| v.value().clone())),
                };
                (slot.key(), value)
            })
            .collect()
    }

    /// Stored entry counts per merge category.
    #[must_use]
    pub fn counts_by_category(&self) -> CategoryCounts {
        let mut counts = CategoryCounts {
            additive: self.additive.values().map(Vec::len).sum(),
            ..CategoryCounts::default()
        };
        for slot in self.single.keys() {
            match slot {
                SingleSlot::Replaceable(_) => counts.replaceable += 1,
                SingleSlot::ConfidenceBased(_) => counts.confidence_based += 1,
            }
        }
        counts
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn set_additive(&mut self, slot: AdditiveSlot, list: Vec<EntityValue<String>>) {
        if list.is_empty() {
            let _ = self.additive.remove(&slot);
        } else {
            let _ = self.additive.insert(slot, list);
        }
    }

    fn touched(mut self, ctx: &MergeContext, submitted: usize) -> Self {
        self.last_updated = ctx.timestamp;
        self.total_extractions = self
            .total_extractions
            .saturating_add(u64::try_from(submitted).unwrap_or(u64::MAX));
        self
    }
}

/// Stored values never carry surrounding whitespace.
fn trimmed(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.len() == value.len() {
        value
    } else {
        trimmed.to_owned()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
