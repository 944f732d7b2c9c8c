//! # parley-entities
//!
//! Structured facts extracted from a conversation, folded into one immutable
//! model per session.
//!
//! - **Slots**: the fixed catalogue of named slots and their merge category
//! - **Merge engine**: additive, replaceable, and confidence-based merges plus removal and correction
//! - **Aggregate**: [`EntityAggregate`], rebuilt (never mutated) by every merge
//! - **Codec**: persisted-record encoding that tolerates legacy and malformed input
//! - **Stats**: read-only quality and timeline queries for observability

#![deny(unsafe_code)]

pub mod aggregate;
pub mod codec;
pub mod extraction;
pub mod merge;
pub mod slots;
pub mod stats;
pub mod value;

pub use aggregate::{AggregateParts, CategoryCounts, EntityAggregate, SummaryValue};
pub use extraction::{ExtractedValues, ExtractionContext, ExtractionInput};
pub use merge::MergeContext;
pub use slots::{AdditiveSlot, ConfidenceSlot, ReplaceableSlot, SingleSlot, Slot, SlotCategory};
pub use stats::{ExtractionStats, TimelineEntry};
pub use value::EntityValue;
