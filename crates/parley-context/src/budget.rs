//! Context window budgeter.
//!
//! The window is split four ways: system prompt, response reserve, running
//! summary, and whatever is left for raw message history. Only the last part
//! flexes; the three reserves are fixed per configuration and are never
//! counted twice.

use parley_core::constants::{SUMMARIZE_OVERSHOOT_DENOMINATOR, SUMMARIZE_OVERSHOOT_NUMERATOR};
use parley_core::{Result, ValidationError};
use parley_settings::ContextWindowSettings;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::levels::ThresholdLevel;

/// The four named token quantities describing a window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextWindowConfig {
    /// Total window size.
    pub max_tokens: u32,
    /// Reserved for the system prompt.
    pub system_prompt_tokens: u32,
    /// Reserved for the model's response.
    pub response_reserved_tokens: u32,
    /// Reserved for the running conversation summary.
    pub summary_tokens: u32,
}

impl ContextWindowConfig {
    /// Sum of the three reserves, widened so it cannot overflow.
    #[must_use]
    pub fn reserved_tokens(&self) -> u64 {
        u64::from(self.system_prompt_tokens)
            + u64::from(self.response_reserved_tokens)
            + u64::from(self.summary_tokens)
    }
}

impl Default for ContextWindowConfig {
    fn default() -> Self {
        Self::from(&ContextWindowSettings::default())
    }
}

impl From<&ContextWindowSettings> for ContextWindowConfig {
    fn from(settings: &ContextWindowSettings) -> Self {
        Self {
            max_tokens: settings.max_tokens,
            system_prompt_tokens: settings.system_prompt_tokens,
            response_reserved_tokens: settings.response_reserved_tokens,
            summary_tokens: settings.summary_tokens,
        }
    }
}

/// Four-way breakdown of the window, for observability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAllocation {
    /// System prompt reserve.
    pub system_prompt: u64,
    /// Response reserve.
    pub response_reserved: u64,
    /// Summary reserve.
    pub summary: u64,
    /// Left for message history.
    pub messages: u64,
    /// Window size; always the sum of the four parts.
    pub total: u64,
}

/// Message-budget usage at a given token count.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextUsage {
    /// Tokens currently taken by message history.
    pub used: u64,
    /// Tokens available for message history.
    pub available: u64,
    /// `used / available`; may exceed 1.
    pub ratio: f64,
    /// Level for `ratio`.
    pub level: ThresholdLevel,
}

/// A validated context window. Cheap to copy; rebuild per configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextWindowBudget {
    config: ContextWindowConfig,
}

impl ContextWindowBudget {
    /// Validate a configuration.
    ///
    /// Fails when the reserves together exceed `max_tokens`.
    pub fn new(config: ContextWindowConfig) -> Result<Self> {
        let reserved = config.reserved_tokens();
        if reserved > u64::from(config.max_tokens) {
            return Err(ValidationError::ReservedTokensExceedMax {
                reserved,
                max_tokens: config.max_tokens,
            });
        }
        Ok(Self { config })
    }

    /// Build from the `contextWindow` settings section.
    pub fn from_settings(settings: &ContextWindowSettings) -> Result<Self> {
        Self::new(settings.into())
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &ContextWindowConfig {
        &self.config
    }

    /// Tokens left for message history once every reserve is taken.
    #[must_use]
    pub fn available_for_messages(&self) -> u64 {
        u64::from(self.config.max_tokens).saturating_sub(self.config.reserved_tokens())
    }

    /// Four-way breakdown plus total.
    #[must_use]
    pub fn allocation(&self) -> TokenAllocation {
        TokenAllocation {
            system_prompt: u64::from(self.config.system_prompt_tokens),
            response_reserved: u64::from(self.config.response_reserved_tokens),
            summary: u64::from(self.config.summary_tokens),
            messages: self.available_for_messages(),
            total: u64::from(self.config.max_tokens),
        }
    }

    /// Whether history has outgrown its share of the window.
    #[must_use]
    pub fn should_summarize(&self, current_tokens: u64) -> bool {
        current_tokens > self.available_for_messages()
    }

    /// How many history tokens one summarization pass should absorb.
    ///
    /// The overflow is scaled by 1.5 (rounded up) so the next turn does not
    /// immediately trip the limit again. Zero when nothing overflows.
    #[must_use]
    pub fn tokens_to_summarize(&self, current_tokens: u64) -> u64 {
        let overflow = current_tokens.saturating_sub(self.available_for_messages());
        overflow
            .saturating_mul(SUMMARIZE_OVERSHOOT_NUMERATOR)
            .div_ceil(SUMMARIZE_OVERSHOOT_DENOMINATOR)
    }

    /// Usage of the message budget at `current_tokens`.
    #[must_use]
    pub fn usage(&self, current_tokens: u64) -> ContextUsage {
        let available = self.available_for_messages();
        #[allow(clippy::cast_precision_loss)]
        let ratio = if available > 0 {
            current_tokens as f64 / available as f64
        } else if current_tokens > 0 {
            1.0
        } else {
            0.0
        };
        let level = ThresholdLevel::from_ratio(ratio);
        debug!(current_tokens, available, ratio, ?level, "context usage");
        ContextUsage {
            used: current_tokens,
            available,
            ratio,
            level,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn config(max: u32, system: u32, response: u32, summary: u32) -> ContextWindowConfig {
        ContextWindowConfig {
            max_tokens: max,
            system_prompt_tokens: system,
            response_reserved_tokens: response,
            summary_tokens: summary,
        }
    }

    fn scenario() -> ContextWindowBudget {
        ContextWindowBudget::new(config(5000, 500, 1500, 200)).unwrap()
    }

    #[test]
    fn scenario_default_window() {
        let budget = scenario();
        assert_eq!(budget.available_for_messages(), 2800);
        assert!(budget.should_summarize(3000));
        assert_eq!(budget.tokens_to_summarize(3800), 1500);
    }

    #[test]
    fn at_the_limit_no_summary_needed() {
        let budget = scenario();
        assert!(!budget.should_summarize(2800));
        assert_eq!(budget.tokens_to_summarize(2800), 0);
        assert_eq!(budget.tokens_to_summarize(0), 0);
        assert!(budget.should_summarize(2801));
    }

    #[test]
    fn overshoot_rounds_up() {
        // 1 token over → 1.5 → 2
        assert_eq!(scenario().tokens_to_summarize(2801), 2);
        assert_eq!(scenario().tokens_to_summarize(2803), 5);
    }

    #[test]
    fn oversubscribed_reserves_rejected() {
        let err = ContextWindowBudget::new(config(1000, 500, 400, 200)).unwrap_err();
        assert_matches!(
            err,
            ValidationError::ReservedTokensExceedMax {
                reserved: 1100,
                max_tokens: 1000
            }
        );
        assert_eq!(err.rule(), "RESERVED_TOKENS_EXCEED_MAX");
    }

    #[test]
    fn reserves_never_overflow() {
        let err = ContextWindowBudget::new(config(u32::MAX, u32::MAX, u32::MAX, u32::MAX)).unwrap_err();
        assert_matches!(err, ValidationError::ReservedTokensExceedMax { .. });
    }

    #[test]
    fn fully_reserved_window_has_no_message_budget() {
        let budget = ContextWindowBudget::new(config(1000, 500, 300, 200)).unwrap();
        assert_eq!(budget.available_for_messages(), 0);
        assert!(budget.should_summarize(1));
        assert_eq!(budget.usage(0).level, ThresholdLevel::Normal);
        assert_eq!(budget.usage(10).level, ThresholdLevel::Exceeded);
    }

    #[test]
    fn allocation_adds_up() {
        let allocation = scenario().allocation();
        assert_eq!(
            allocation,
            TokenAllocation {
                system_prompt: 500,
                response_reserved: 1500,
                summary: 200,
                messages: 2800,
                total: 5000,
            }
        );
        let json = serde_json::to_value(allocation).unwrap();
        assert_eq!(json["responseReserved"], 1500);
    }

    #[test]
    fn usage_levels_track_ratio() {
        let budget = scenario();
        assert_eq!(budget.usage(1000).level, ThresholdLevel::Normal);
        assert_eq!(budget.usage(1400).level, ThresholdLevel::Warning);
        assert_eq!(budget.usage(1960).level, ThresholdLevel::Alert);
        assert_eq!(budget.usage(2380).level, ThresholdLevel::Critical);
        assert_eq!(budget.usage(2660).level, ThresholdLevel::Exceeded);
        let usage = budget.usage(1400);
        assert_eq!(usage.available, 2800);
        assert!((usage.ratio - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn from_settings_uses_defaults() {
        let budget = ContextWindowBudget::from_settings(&ContextWindowSettings::default()).unwrap();
        assert_eq!(*budget.config(), ContextWindowConfig::default());
        assert_eq!(budget.available_for_messages(), 2800);
    }

    #[test]
    fn config_serde_is_camel_case() {
        let parsed: ContextWindowConfig = serde_json::from_value(serde_json::json!({
            "maxTokens": 8000,
            "systemPromptTokens": 1000,
            "responseReservedTokens": 2000,
            "summaryTokens": 500,
        }))
        .unwrap();
        assert_eq!(parsed, config(8000, 1000, 2000, 500));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn valid_config() -> impl Strategy<Value = ContextWindowConfig> {
            (0u32..200_000)
                .prop_flat_map(|max| (Just(max), 0..=max))
                .prop_flat_map(|(max, system)| (Just(max), Just(system), 0..=max - system))
                .prop_flat_map(|(max, system, response)| {
                    (Just(max), Just(system), Just(response), 0..=max - system - response)
                })
                .prop_map(|(max, system, response, summary)| config(max, system, response, summary))
        }

        proptest! {
            #[test]
            fn budget_conservation(cfg in valid_config()) {
                let budget = ContextWindowBudget::new(cfg).unwrap();
                let allocation = budget.allocation();
                prop_assert_eq!(
                    budget.available_for_messages() + cfg.reserved_tokens(),
                    u64::from(cfg.max_tokens)
                );
                prop_assert_eq!(
                    allocation.system_prompt + allocation.response_reserved + allocation.summary + allocation.messages,
                    allocation.total
                );
            }

            #[test]
            fn should_summarize_is_monotonic(cfg in valid_config(), x in 0u64..400_000, extra in 0u64..400_000) {
                let budget = ContextWindowBudget::new(cfg).unwrap();
                if budget.should_summarize(x) {
                    prop_assert!(budget.should_summarize(x + extra));
                }
            }

            #[test]
            fn summarize_amount_covers_overflow(cfg in valid_config(), x in 0u64..400_000) {
                let budget = ContextWindowBudget::new(cfg).unwrap();
                let amount = budget.tokens_to_summarize(x);
                prop_assert_eq!(amount > 0, budget.should_summarize(x));
                prop_assert!(amount >= x.saturating_sub(budget.available_for_messages()));
            }
        }
    }
}
