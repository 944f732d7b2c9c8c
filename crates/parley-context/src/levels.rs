//! Usage threshold levels.

use parley_core::constants::Thresholds;
use serde::{Deserialize, Serialize};

/// How full the message budget is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdLevel {
    /// Under 50% usage.
    Normal,
    /// 50–70% usage.
    Warning,
    /// 70–85% usage, summarization advisable.
    Alert,
    /// 85–95% usage.
    Critical,
    /// 95% and above.
    Exceeded,
}

impl ThresholdLevel {
    /// Level for a usage ratio.
    #[must_use]
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= Thresholds::EXCEEDED {
            Self::Exceeded
        } else if ratio >= Thresholds::CRITICAL {
            Self::Critical
        } else if ratio >= Thresholds::ALERT {
            Self::Alert
        } else if ratio >= Thresholds::WARNING {
            Self::Warning
        } else {
            Self::Normal
        }
    }

    /// Whether this level calls for attention (alert or worse).
    #[must_use]
    pub fn is_elevated(self) -> bool {
        self >= Self::Alert
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_level_from_ratio() {
        assert_eq!(ThresholdLevel::from_ratio(0.0), ThresholdLevel::Normal);
        assert_eq!(ThresholdLevel::from_ratio(0.49), ThresholdLevel::Normal);
        assert_eq!(ThresholdLevel::from_ratio(0.50), ThresholdLevel::Warning);
        assert_eq!(ThresholdLevel::from_ratio(0.69), ThresholdLevel::Warning);
        assert_eq!(ThresholdLevel::from_ratio(0.70), ThresholdLevel::Alert);
        assert_eq!(ThresholdLevel::from_ratio(0.84), ThresholdLevel::Alert);
        assert_eq!(ThresholdLevel::from_ratio(0.85), ThresholdLevel::Critical);
        assert_eq!(ThresholdLevel::from_ratio(0.94), ThresholdLevel::Critical);
        assert_eq!(ThresholdLevel::from_ratio(0.95), ThresholdLevel::Exceeded);
        assert_eq!(ThresholdLevel::from_ratio(1.7), ThresholdLevel::Exceeded);
    }

    #[test]
    fn nan_ratio_is_normal() {
        assert_eq!(ThresholdLevel::from_ratio(f64::NAN), ThresholdLevel::Normal);
    }

    #[test]
    fn elevated_from_alert_up() {
        assert!(!ThresholdLevel::Warning.is_elevated());
        assert!(ThresholdLevel::Alert.is_elevated());
        assert!(ThresholdLevel::Exceeded.is_elevated());
    }

    #[test]
    fn threshold_level_serde_roundtrip() {
        for level in [
            ThresholdLevel::Normal,
            ThresholdLevel::Warning,
            ThresholdLevel::Alert,
            ThresholdLevel::Critical,
            ThresholdLevel::Exceeded,
        ] {
            let json = serde_json::to_string(&level).unwrap();
            let back: ThresholdLevel = serde_json::from_str(&json).unwrap();
            assert_eq!(level, back);
        }
        assert_eq!(serde_json::to_string(&ThresholdLevel::Alert).unwrap(), "\"alert\"");
    }
}
