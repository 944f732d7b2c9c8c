//! Read-only statistics over an aggregate, for observability and decision support.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{CategoryCounts, EntityAggregate};
use crate::slots::Slot;

/// Weight of slot coverage in [`EntityAggregate::quality_score`].
const COVERAGE_WEIGHT: f64 = 0.6;
/// Weight of average confidence in [`EntityAggregate::quality_score`].
const CONFIDENCE_WEIGHT: f64 = 0.4;

/// One stored entity, flattened for a chronological view.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    /// Slot holding the entity.
    pub slot: Slot,
    /// Stored value.
    pub value: String,
    /// Extraction time.
    pub extracted_at: DateTime<Utc>,
    /// Extractor confidence.
    pub confidence: f64,
    /// Source message.
    pub source_message_id: String,
}

/// Snapshot of every statistic, for logging or dashboards.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionStats {
    /// Values submitted over the session.
    pub total_extractions: u64,
    /// Values currently stored.
    pub stored_entities: usize,
    /// Stored entries per category.
    pub counts: CategoryCounts,
    /// Slots holding at least one value.
    pub filled_slots: usize,
    /// Mean confidence of stored values.
    pub average_confidence: Option<f64>,
    /// Stored values strictly above the threshold passed in.
    pub high_confidence: usize,
    /// Earliest stored extraction.
    pub oldest_extraction: Option<DateTime<Utc>>,
    /// Latest stored extraction.
    pub newest_extraction: Option<DateTime<Utc>>,
    /// Combined quality score in `[0, 1]`.
    pub quality_score: f64,
}

impl EntityAggregate {
    /// Mean confidence of stored values, `None` when nothing is stored.
    #[must_use]
    pub fn average_confidence(&self) -> Option<f64> {
        let (sum, count) = self
            .entities()
            .fold((0.0, 0_u32), |(sum, count), (_, v)| (sum + v.confidence().get(), count + 1));
        (count > 0).then(|| sum / f64::from(count))
    }

    /// Stored values with confidence strictly above `threshold`.
    #[must_use]
    pub fn count_above_confidence(&self, threshold: f64) -> usize {
        self.entities()
            .filter(|(_, v)| v.confidence().get() > threshold)
            .count()
    }

    /// Earliest extraction time among stored values.
    #[must_use]
    pub fn oldest_extraction(&self) -> Option<DateTime<Utc>> {
        self.entities().map(|(_, v)| v.extracted_at()).min()
    }

    /// Latest extraction time among stored values.
    #[must_use]
    pub fn newest_extraction(&self) -> Option<DateTime<Utc>> {
        self.entities().map(|(_, v)| v.extracted_at()).max()
    }

    /// Number of slots holding at least one value.
    #[must_use]
    pub fn filled_slots(&self) -> usize {
        Slot::all()
            .filter(|slot| match slot {
                Slot::Additive(s) => !self.additive(*s).is_empty(),
                Slot::Single(s) => self.single(*s).is_some(),
            })
            .count()
    }

    /// Stored values in extraction order (stable for equal timestamps).
    #[must_use]
    pub fn timeline(&self) -> Vec<TimelineEntry> {
        let mut entries: Vec<_> = self
            .entities()
            .map(|(slot, v)| TimelineEntry {
                slot,
                value: v.value().clone(),
                extracted_at: v.extracted_at(),
                confidence: v.confidence().get(),
                source_message_id: v.source_message_id().to_string(),
            })
            .collect();
        entries.sort_by_key(|e| e.extracted_at);
        entries
    }

    /// `0.6 × slot coverage + 0.4 × average confidence`; zero when nothing is stored.
    #[must_use]
    pub fn quality_score(&self) -> f64 {
        let Some(average) = self.average_confidence() else {
            return 0.0;
        };
        #[allow(clippy::cast_precision_loss)]
        let coverage = self.filled_slots() as f64 / Slot::all().count() as f64;
        COVERAGE_WEIGHT * coverage + CONFIDENCE_WEIGHT * average
    }

    /// Every statistic at once; `high_confidence` counts values above `threshold`.
    #[must_use]
    pub fn extraction_stats(&self, threshold: f64) -> ExtractionStats {
        let counts = self.counts_by_category();
        ExtractionStats {
            total_extractions: self.total_extractions(),
            stored_entities: counts.total(),
            counts,
            filled_slots: self.filled_slots(),
            average_confidence: self.average_confidence(),
            high_confidence: self.count_above_confidence(threshold),
            oldest_extraction: self.oldest_extraction(),
            newest_extraction: self.newest_extraction(),
            quality_score: self.quality_score(),
        }
    }
}
