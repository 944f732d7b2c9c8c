//! The fixed slot catalogue.
//!
//! A slot's merge category belongs to its name, not to any stored value:
//! `budget` is always replaceable, `painPoints` always additive. Every slot
//! has a stable camelCase key used as its persisted field name.

use std::fmt;

use parley_core::ValidationError;
use serde::{Deserialize, Serialize};

/// How a slot resolves conflicting submissions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotCategory {
    /// Accumulates unique values.
    Additive,
    /// Newest submission wins.
    Replaceable,
    /// Higher confidence wins, subject to a threshold.
    ConfidenceBased,
}

/// Slots that accumulate a deduplicated list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdditiveSlot {
    /// People who sign off on the purchase.
    DecisionMakers,
    /// Problems the visitor wants solved.
    PainPoints,
    /// Outcomes the visitor is after.
    Goals,
    /// Tools or vendors already in use.
    CurrentTools,
}

impl AdditiveSlot {
    /// Every additive slot, in persisted order.
    pub const ALL: [Self; 4] = [
        Self::DecisionMakers,
        Self::PainPoints,
        Self::Goals,
        Self::CurrentTools,
    ];

    /// Persisted field name.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::DecisionMakers => "decisionMakers",
            Self::PainPoints => "painPoints",
            Self::Goals => "goals",
            Self::CurrentTools => "currentTools",
        }
    }

    /// Singular noun for human-readable summaries ("2 pain point(s) removed").
    #[must_use]
    pub const fn noun(self) -> &'static str {
        match self {
            Self::DecisionMakers => "decision maker",
            Self::PainPoints => "pain point",
            Self::Goals => "goal",
            Self::CurrentTools => "current tool",
        }
    }
}

/// Slots that keep only the newest submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplaceableSlot {
    /// Stated budget.
    Budget,
    /// Purchase or rollout timeline.
    Timeline,
    /// How pressing the need is.
    Urgency,
    /// Preferred way to be contacted.
    ContactMethod,
}

impl ReplaceableSlot {
    /// Every replaceable slot, in persisted order.
    pub const ALL: [Self; 4] = [Self::Budget, Self::Timeline, Self::Urgency, Self::ContactMethod];

    /// Persisted field name.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::Timeline => "timeline",
            Self::Urgency => "urgency",
            Self::ContactMethod => "contactMethod",
        }
    }

    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Budget => "Budget",
            Self::Timeline => "Timeline",
            Self::Urgency => "Urgency",
            Self::ContactMethod => "Contact method",
        }
    }
}

/// Slots that keep the most confident submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfidenceSlot {
    /// The visitor's name.
    VisitorName,
    /// The visitor's job role.
    Role,
    /// Industry of the visitor's company.
    Industry,
    /// The visitor's company.
    Company,
    /// Size of the visitor's team.
    TeamSize,
}

impl ConfidenceSlot {
    /// Every confidence-based slot, in persisted order.
    pub const ALL: [Self; 5] = [
        Self::VisitorName,
        Self::Role,
        Self::Industry,
        Self::Company,
        Self::TeamSize,
    ];

    /// Persisted field name.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::VisitorName => "visitorName",
            Self::Role => "role",
            Self::Industry => "industry",
            Self::Company => "company",
            Self::TeamSize => "teamSize",
        }
    }

    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::VisitorName => "Name",
            Self::Role => "Role",
            Self::Industry => "Industry",
            Self::Company => "Company",
            Self::TeamSize => "Team size",
        }
    }
}

/// A slot holding at most one value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SingleSlot {
    /// Newest wins.
    Replaceable(ReplaceableSlot),
    /// Most confident wins.
    ConfidenceBased(ConfidenceSlot),
}

impl SingleSlot {
    /// Every single-valued slot, replaceable first.
    pub fn all() -> impl Iterator<Item = Self> {
        ReplaceableSlot::ALL
            .into_iter()
            .map(Self::Replaceable)
            .chain(ConfidenceSlot::ALL.into_iter().map(Self::ConfidenceBased))
    }

    /// Persisted field name.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Replaceable(s) => s.key(),
            Self::ConfidenceBased(s) => s.key(),
        }
    }

    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Replaceable(s) => s.label(),
            Self::ConfidenceBased(s) => s.label(),
        }
    }

    /// Merge category.
    #[must_use]
    pub const fn category(self) -> SlotCategory {
        match self {
            Self::Replaceable(_) => SlotCategory::Replaceable,
            Self::ConfidenceBased(_) => SlotCategory::ConfidenceBased,
        }
    }

    /// Look up a single-valued slot by persisted key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match Slot::from_key(key)? {
            Slot::Single(s) => Some(s),
            Slot::Additive(_) => None,
        }
    }
}

impl From<ReplaceableSlot> for SingleSlot {
    fn from(slot: ReplaceableSlot) -> Self {
        Self::Replaceable(slot)
    }
}

impl From<ConfidenceSlot> for SingleSlot {
    fn from(slot: ConfidenceSlot) -> Self {
        Self::ConfidenceBased(slot)
    }
}

impl fmt::Display for SingleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl Serialize for SingleSlot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for SingleSlot {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        Self::from_key(&key)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown single-valued slot: {key}")))
    }
}

/// Any slot in the catalogue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    /// A list slot.
    Additive(AdditiveSlot),
    /// A single-value slot.
    Single(SingleSlot),
}

impl Slot {
    /// Every slot, in persisted order.
    pub fn all() -> impl Iterator<Item = Self> {
        AdditiveSlot::ALL
            .into_iter()
            .map(Self::Additive)
            .chain(SingleSlot::all().map(Self::Single))
    }

    /// Persisted field name.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Additive(s) => s.key(),
            Self::Single(s) => s.key(),
        }
    }

    /// Merge category.
    #[must_use]
    pub const fn category(self) -> SlotCategory {
        match self {
            Self::Additive(_) => SlotCategory::Additive,
            Self::Single(s) => s.category(),
        }
    }

    /// Look up a slot by persisted key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::all().find(|slot| slot.key() == key)
    }

    /// Look up a slot by name, failing with [`ValidationError::UnknownSlot`].
    ///
    /// Accepts the camelCase key as well as `snake_case` spellings.
    pub fn parse(name: &str) -> Result<Self, ValidationError> {
        let trimmed = name.trim();
        Self::from_key(trimmed)
            .or_else(|| {
                let camel = snake_to_camel(trimmed);
                Self::from_key(&camel)
            })
            .ok_or_else(|| ValidationError::UnknownSlot(name.to_owned()))
    }
}

fn snake_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

impl From<AdditiveSlot> for Slot {
    fn from(slot: AdditiveSlot) -> Self {
        Self::Additive(slot)
    }
}

impl From<ReplaceableSlot> for Slot {
    fn from(slot: ReplaceableSlot) -> Self {
        Self::Single(slot.into())
    }
}

impl From<ConfidenceSlot> for Slot {
    fn from(slot: ConfidenceSlot) -> Self {
        Self::Single(slot.into())
    }
}

impl From<SingleSlot> for Slot {
    fn from(slot: SingleSlot) -> Self {
        Self::Single(slot)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl Serialize for Slot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn keys_are_unique() {
        let mut keys: Vec<_> = Slot::all().map(Slot::key).collect();
        let total = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), total);
        assert_eq!(total, 13);
    }

    #[test]
    fn serde_names_match_keys() {
        for slot in AdditiveSlot::ALL {
            assert_eq!(serde_json::to_value(slot).unwrap(), slot.key());
        }
        for slot in ReplaceableSlot::ALL {
            assert_eq!(serde_json::to_value(slot).unwrap(), slot.key());
        }
        for slot in ConfidenceSlot::ALL {
            assert_eq!(serde_json::to_value(slot).unwrap(), slot.key());
        }
    }

    #[test]
    fn categories_follow_slot_names() {
        assert_eq!(Slot::from(ReplaceableSlot::Budget).category(), SlotCategory::Replaceable);
        assert_eq!(Slot::from(AdditiveSlot::PainPoints).category(), SlotCategory::Additive);
        assert_eq!(
            Slot::from(ConfidenceSlot::Company).category(),
            SlotCategory::ConfidenceBased
        );
    }

    #[test]
    fn parse_accepts_camel_and_snake() {
        assert_eq!(Slot::parse("painPoints").unwrap(), AdditiveSlot::PainPoints.into());
        assert_eq!(Slot::parse("contact_method").unwrap(), ReplaceableSlot::ContactMethod.into());
        assert_eq!(Slot::parse(" teamSize ").unwrap(), ConfidenceSlot::TeamSize.into());
    }

    #[test]
    fn parse_rejects_unknown() {
        assert_matches!(Slot::parse("favoriteColor"), Err(ValidationError::UnknownSlot(name)) if name == "favoriteColor");
    }

    #[test]
    fn single_slot_round_trips_through_serde() {
        let slot = SingleSlot::from(ConfidenceSlot::VisitorName);
        let json = serde_json::to_string(&slot).unwrap();
        assert_eq!(json, "\"visitorName\"");
        assert_eq!(serde_json::from_str::<SingleSlot>(&json).unwrap(), slot);
        assert!(serde_json::from_str::<SingleSlot>("\"goals\"").is_err());
    }
}
