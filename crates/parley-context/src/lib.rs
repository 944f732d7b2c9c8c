//! # parley-context
//!
//! Stateless arithmetic over a fixed context window.
//!
//! A [`ContextWindowBudget`] partitions the window into system prompt,
//! response reserve, summary and message history, and answers two per-turn
//! questions: does history need summarizing, and by how much.

#![deny(unsafe_code)]

pub mod budget;
pub mod levels;

pub use budget::{ContextUsage, ContextWindowBudget, ContextWindowConfig, TokenAllocation};
pub use levels::ThresholdLevel;
