//! Shared constants for extraction defaults, legacy decoding, and budgeting.

// =============================================================================
// Extraction defaults
// =============================================================================

/// Confidence assigned to an extraction when the caller supplies none.
pub const DEFAULT_CONFIDENCE: f64 = 0.9;

/// An existing confidence-based value must exceed this to resist replacement.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

// =============================================================================
// Legacy decoding
// =============================================================================

/// Confidence given to values recovered from legacy bare-string records.
pub const LEGACY_CONFIDENCE: f64 = 0.5;

/// Provenance tag for values recovered from legacy bare-string records.
pub const LEGACY_SOURCE_MESSAGE_ID: &str = "legacy";

/// Provenance tag for structured values missing their source message id.
pub const UNKNOWN_SOURCE_MESSAGE_ID: &str = "unknown";

// =============================================================================
// Context window
// =============================================================================

/// Overshoot applied when sizing a summarization pass (numerator of 1.5).
pub const SUMMARIZE_OVERSHOOT_NUMERATOR: u64 = 3;

/// Overshoot applied when sizing a summarization pass (denominator of 1.5).
pub const SUMMARIZE_OVERSHOOT_DENOMINATOR: u64 = 2;

/// Context usage threshold ratios for escalating warnings.
pub struct Thresholds;

impl Thresholds {
    /// 50%: yellow zone.
    pub const WARNING: f64 = 0.50;
    /// 70%: orange zone, summarization advisable.
    pub const ALERT: f64 = 0.70;
    /// 85%: red zone.
    pub const CRITICAL: f64 = 0.85;
    /// 95%: hard limit.
    pub const EXCEEDED: f64 = 0.95;
}
