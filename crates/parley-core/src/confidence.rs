//! Validated confidence scores.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_CONFIDENCE;
use crate::errors::{Result, ValidationError};

/// An extraction confidence in `[0, 1]`.
///
/// The only way to obtain one is [`Confidence::new`] (or the defaults), so a
/// value in hand is always in range.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    /// Zero confidence.
    pub const ZERO: Self = Self(0.0);
    /// Full confidence.
    pub const MAX: Self = Self(1.0);

    /// Validate a raw score. NaN and values outside `[0, 1]` are rejected.
    pub fn new(value: f64) -> Result<Self> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ValidationError::ConfidenceOutOfRange { value })
        }
    }

    /// Clamp a raw score into range; NaN maps to `fallback`.
    #[must_use]
    pub fn clamped(value: f64, fallback: Self) -> Self {
        if value.is_nan() {
            fallback
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    /// The raw score.
    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self(DEFAULT_CONFIDENCE)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl TryFrom<f64> for Confidence {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for Confidence {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}
