//! Canonical forms for equality testing.
//!
//! Normalization decides whether two extracted values mean the same thing
//! ("Increase Sales" vs "INCREASE SALES!"). It is never used for display:
//! stored values keep the casing and punctuation of their first occurrence.

use serde::{Deserialize, Serialize};

/// Toggles for the three normalization steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NormalizeOptions {
    /// Trim leading and trailing whitespace.
    pub trim: bool,
    /// Fold to lowercase.
    pub lowercase: bool,
    /// Drop every character outside `[a-z0-9]`.
    pub strip_punctuation: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            trim: true,
            lowercase: true,
            strip_punctuation: true,
        }
    }
}

impl NormalizeOptions {
    /// Options that leave the value untouched.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            trim: false,
            lowercase: false,
            strip_punctuation: false,
        }
    }
}

/// Produce the canonical form of `value`.
///
/// With lowercasing disabled, stripping keeps ASCII letters of either case.
#[must_use]
pub fn normalize(value: &str, options: &NormalizeOptions) -> String {
    let mut out = if options.trim { value.trim() } else { value }.to_owned();
    if options.lowercase {
        out = out.to_lowercase();
    }
    if options.strip_punctuation {
        out.retain(|c| c.is_ascii_digit() || c.is_ascii_lowercase() || (!options.lowercase && c.is_ascii_uppercase()));
    }
    out
}

/// Whether two values share a canonical form.
#[must_use]
pub fn normalized_eq(a: &str, b: &str, options: &NormalizeOptions) -> bool {
    normalize(a, options) == normalize(b, options)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_folds_case_and_punctuation() {
        let opts = NormalizeOptions::default();
        assert_eq!(normalize("  INCREASE SALES! ", &opts), "increasesales");
        assert_eq!(normalize("Increase Sales", &opts), "increasesales");
        assert_eq!(normalize("$100K", &opts), "100k");
    }

    #[test]
    fn trim_only() {
        let opts = NormalizeOptions {
            trim: true,
            ..NormalizeOptions::none()
        };
        assert_eq!(normalize("  Jane Doe  ", &opts), "Jane Doe");
    }

    #[test]
    fn lowercase_only() {
        let opts = NormalizeOptions {
            lowercase: true,
            ..NormalizeOptions::none()
        };
        assert_eq!(normalize(" Jane-Doe ", &opts), " jane-doe ");
    }

    #[test]
    fn strip_without_lowercase_keeps_capitals() {
        let opts = NormalizeOptions {
            strip_punctuation: true,
            ..NormalizeOptions::none()
        };
        assert_eq!(normalize("Jane-Doe 2", &opts), "JaneDoe2");
    }

    #[test]
    fn none_is_identity() {
        assert_eq!(normalize(" A.b ", &NormalizeOptions::none()), " A.b ");
    }

    #[test]
    fn non_ascii_is_stripped() {
        assert_eq!(normalize("Café", &NormalizeOptions::default()), "caf");
    }

    #[test]
    fn normalized_eq_compares_canonical_forms() {
        let opts = NormalizeOptions::default();
        assert!(normalized_eq("CRM", "crm.", &opts));
        assert!(!normalized_eq("CRM", "ERP", &opts));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn normalize_is_idempotent(s in ".{0,40}") {
                let opts = NormalizeOptions::default();
                let once = normalize(&s, &opts);
                prop_assert_eq!(normalize(&once, &opts), once);
            }

            #[test]
            fn default_output_is_lower_alnum(s in ".{0,40}") {
                let out = normalize(&s, &NormalizeOptions::default());
                prop_assert!(out.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
            }
        }
    }
}
