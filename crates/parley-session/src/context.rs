//! The per-session facade.

use chrono::Utc;
use parley_context::{ContextUsage, ContextWindowBudget};
use parley_core::{Result, SessionId};
use parley_corrections::{CorrectionContext, CorrectionLedger};
use parley_entities::{EntityAggregate, ExtractionContext, ExtractionInput, Slot};
use serde::Serialize;
use tracing::{debug, info};

/// What the caller should do about history before the next model call.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnPlan {
    /// History has outgrown its share of the window.
    pub should_summarize: bool,
    /// Tokens the summarization pass should absorb (0 when not needed).
    pub tokens_to_summarize: u64,
    /// Message-budget usage.
    pub usage: ContextUsage,
}

/// Everything parley tracks for one conversation.
///
/// Immutable like its parts: every operation returns a successor. The
/// `revision` is the stored revision this snapshot was loaded at and is only
/// advanced by a [`SessionStore`](crate::SessionStore).
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationContext {
    session_id: SessionId,
    entities: EntityAggregate,
    corrections: CorrectionLedger,
    revision: u64,
}

impl ConversationContext {
    /// A fresh session with no entities, no corrections and revision 0.
    pub fn new(session_id: impl Into<SessionId>) -> Result<Self> {
        let session_id = session_id.into();
        let corrections = CorrectionLedger::create(session_id.clone(), None)?;
        Ok(Self {
            session_id,
            entities: EntityAggregate::empty(),
            corrections,
            revision: 0,
        })
    }

    pub(crate) fn from_parts(
        session_id: SessionId,
        entities: EntityAggregate,
        corrections: CorrectionLedger,
        revision: u64,
    ) -> Self {
        Self {
            session_id,
            entities,
            corrections,
            revision,
        }
    }

    /// Same snapshot stamped with another stored revision.
    #[must_use]
    pub(crate) fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// Session id.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Live entity state.
    #[must_use]
    pub fn entities(&self) -> &EntityAggregate {
        &self.entities
    }

    /// Correction audit trail.
    #[must_use]
    pub fn corrections(&self) -> &CorrectionLedger {
        &self.corrections
    }

    /// Stored revision this snapshot descends from.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    // ── Updates (return a successor) ────────────────────────────────────

    /// Fold one extractor output into the entities.
    pub fn apply_extraction(&self, input: &ExtractionInput, base: &ExtractionContext) -> Result<Self> {
        Ok(Self {
            entities: self.entities.apply_extraction(input, base)?,
            ..self.clone()
        })
    }

    /// Fold a turn's worth of extractor outputs, in order. All or nothing.
    pub fn apply_extractions(&self, inputs: &[ExtractionInput], base: &ExtractionContext) -> Result<Self> {
        let entities = inputs
            .iter()
            .try_fold(self.entities.clone(), |agg, input| agg.apply_extraction(input, base))?;
        debug!(session_id = %self.session_id, inputs = inputs.len(), "extractions applied");
        Ok(Self {
            entities,
            ..self.clone()
        })
    }

    /// Remove a value the user disputed: audit it, then drop it.
    ///
    /// Only additive slots accept removals; single-valued slots are corrected.
    pub fn remove_entity(
        &self,
        slot: impl Into<Slot>,
        value: &str,
        ctx: &ExtractionContext,
        reason: Option<&str>,
    ) -> Result<Self> {
        let slot = slot.into();
        let ctx = pinned(ctx);
        let corrections =
            self.corrections
                .with_removed_entity(slot, value, &correction_context(&ctx, reason))?;
        let entities = self.entities.with_removed(slot, value, &ctx)?;
        info!(session_id = %self.session_id, slot = slot.key(), "entity removed by user");
        Ok(Self {
            entities,
            corrections,
            ..self.clone()
        })
    }

    /// Apply a user correction: audit it with the value it replaces, then
    /// overwrite regardless of confidence.
    ///
    /// Only single-valued slots accept corrections.
    pub fn correct_entity(
        &self,
        slot: impl Into<Slot>,
        value: &str,
        ctx: &ExtractionContext,
        reason: Option<&str>,
    ) -> Result<Self> {
        let slot = slot.into();
        let ctx = pinned(ctx);
        let previous = match slot {
            Slot::Single(single) => self.entities.single(single).map(|v| v.value().as_str()),
            Slot::Additive(_) => None,
        };
        let corrections = self.corrections.with_corrected_entity(
            slot,
            value,
            previous,
            &correction_context(&ctx, reason),
        )?;
        let entities = self.entities.with_corrected(slot, value.trim(), &ctx)?;
        info!(
            session_id = %self.session_id,
            slot = slot.key(),
            had_previous = previous.is_some(),
            "entity corrected by user"
        );
        Ok(Self {
            entities,
            corrections,
            ..self.clone()
        })
    }

    // ── Budgeting ───────────────────────────────────────────────────────

    /// Decide whether history needs summarizing before the next model call.
    #[must_use]
    pub fn plan_turn(&self, budget: &ContextWindowBudget, current_tokens: u64) -> TurnPlan {
        let plan = TurnPlan {
            should_summarize: budget.should_summarize(current_tokens),
            tokens_to_summarize: budget.tokens_to_summarize(current_tokens),
            usage: budget.usage(current_tokens),
        };
        debug!(
            session_id = %self.session_id,
            current_tokens,
            should_summarize = plan.should_summarize,
            tokens_to_summarize = plan.tokens_to_summarize,
            level = ?plan.usage.level,
            "turn planned"
        );
        plan
    }
}

/// Fix "now" once so the aggregate and the ledger record the same instant.
fn pinned(ctx: &ExtractionContext) -> ExtractionContext {
    ctx.clone().at(ctx.timestamp.unwrap_or_else(Utc::now))
}

fn correction_context(ctx: &ExtractionContext, reason: Option<&str>) -> CorrectionContext {
    CorrectionContext {
        source_message_id: ctx.source_message_id.clone(),
        confidence: ctx.confidence,
        reason: reason.map(str::to_owned),
        timestamp: ctx.timestamp,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
