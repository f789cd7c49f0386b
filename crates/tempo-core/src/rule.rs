//! URL rules and the ordered rule list
//!
//! A [`RuleModel`] is an immutable value: every edit goes through a `with_*`
//! function that returns a new rule. The [`RuleList`] keeps entries in an
//! arena keyed by id plus a separate order, so identity survives reordering
//! and removal.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::fx::FxPair;
use crate::types::{clamp_speed, SPEED_DEFAULT, SPEED_MAX, SPEED_MIN};

// =============================================================================
// Rule Identity
// =============================================================================

/// Stable rule identifier, assigned once at creation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RuleId(pub String);

impl RuleId {
    /// A fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RuleId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// =============================================================================
// Match Type / Target Type
// =============================================================================

/// How a rule's `match` string is compared against a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum MatchType {
    StartsWith,
    Contains,
    Regex,
}

impl MatchType {
    /// Canonical pattern installed when a rule switches to this mode.
    pub fn default_pattern(self) -> &'static str {
        match self {
            Self::StartsWith => "https://www.twitch.tv",
            Self::Contains => "twitch.tv",
            Self::Regex => r"twitch\.tv",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "STARTS_WITH" => Some(Self::StartsWith),
            "CONTAINS" => Some(Self::Contains),
            "REGEX" => Some(Self::Regex),
            _ => None,
        }
    }
}

/// Which part of the tab state a rule overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum TargetType {
    State,
    Speed,
    Fx,
}

impl TargetType {
    pub const ALL: [TargetType; 3] = [Self::State, Self::Speed, Self::Fx];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "STATE" => Some(Self::State),
            "SPEED" => Some(Self::Speed),
            "FX" => Some(Self::Fx),
            _ => None,
        }
    }

    /// Payload a rule gets when it switches to this target.
    pub fn default_override(self) -> RuleOverride {
        match self {
            Self::State => RuleOverride::State(true),
            Self::Speed => RuleOverride::Speed(SPEED_DEFAULT),
            Self::Fx => RuleOverride::Fx(FxPair::default()),
        }
    }
}

/// The single override payload a rule carries. Its variant is the rule's target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum RuleOverride {
    State(bool),
    Speed(f64),
    Fx(FxPair),
}

impl RuleOverride {
    pub fn target(&self) -> TargetType {
        match self {
            Self::State(_) => TargetType::State,
            Self::Speed(_) => TargetType::Speed,
            Self::Fx(_) => TargetType::Fx,
        }
    }

    /// Clamps out-of-range payload values.
    pub fn sanitized(self) -> Self {
        match self {
            Self::Speed(speed) => Self::Speed(clamp_speed(speed)),
            other => other,
        }
    }
}

// =============================================================================
// Rule Errors
// =============================================================================

/// Problems found in a single rule. None of these abort resolution; a rule
/// with an invalid pattern simply never matches.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleError {
    #[error("rule {id}: invalid regex: {message}")]
    InvalidRegex { id: RuleId, message: String },
    #[error("rule {id}: speed {speed} outside [{}, {}]", SPEED_MIN, SPEED_MAX)]
    SpeedOutOfRange { id: RuleId, speed: f64 },
    #[error("rule {id}: empty match pattern")]
    EmptyPattern { id: RuleId },
    #[error("duplicate rule id {0}")]
    DuplicateId(RuleId),
}

// =============================================================================
// Rule Model
// =============================================================================

/// One user-authored URL rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RuleModel {
    pub id: RuleId,
    pub enabled: bool,
    /// Evaluated only when a frame first loads (ILO).
    pub initial_load_only: bool,
    /// Case-sensitive comparison. Lax (LAX) rules compare case-insensitively.
    pub strict: bool,
    pub match_type: MatchType,
    #[serde(rename = "match")]
    pub pattern: String,
    #[serde(rename = "override")]
    pub payload: RuleOverride,
}

impl RuleModel {
    /// A new rule with a generated id and default fields.
    pub fn new() -> Self {
        Self::with_id(RuleId::generate())
    }

    /// A rule with default fields and the given id.
    pub fn with_id(id: RuleId) -> Self {
        Self {
            id,
            enabled: true,
            initial_load_only: false,
            strict: false,
            match_type: MatchType::Contains,
            pattern: MatchType::Contains.default_pattern().to_string(),
            payload: TargetType::Speed.default_override(),
        }
    }

    pub fn target(&self) -> TargetType {
        self.payload.target()
    }

    pub fn with_enabled(&self, enabled: bool) -> Self {
        Self {
            enabled,
            ..self.clone()
        }
    }

    pub fn with_initial_load_only(&self, initial_load_only: bool) -> Self {
        Self {
            initial_load_only,
            ..self.clone()
        }
    }

    pub fn with_strict(&self, strict: bool) -> Self {
        Self {
            strict,
            ..self.clone()
        }
    }

    /// Switches the match mode. The pattern is reset to the mode's default
    /// literal whenever the mode actually changes.
    pub fn with_match_type(&self, match_type: MatchType) -> Self {
        if match_type == self.match_type {
            return self.clone();
        }
        Self {
            match_type,
            pattern: match_type.default_pattern().to_string(),
            ..self.clone()
        }
    }

    pub fn with_pattern(&self, pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..self.clone()
        }
    }

    /// Switches the target. The payload is kept when the target is unchanged.
    pub fn with_target(&self, target: TargetType) -> Self {
        if target == self.target() {
            return self.clone();
        }
        Self {
            payload: target.default_override(),
            ..self.clone()
        }
    }

    /// Replaces the payload; speeds are clamped into range.
    pub fn with_override(&self, payload: RuleOverride) -> Self {
        Self {
            payload: payload.sanitized(),
            ..self.clone()
        }
    }

    pub fn sanitized(self) -> Self {
        Self {
            payload: self.payload.sanitized(),
            ..self
        }
    }
}

impl Default for RuleModel {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Rule List
// =============================================================================

/// Ordered rules with stable identity. Serialized as a plain ordered array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<RuleModel>", into = "Vec<RuleModel>")]
pub struct RuleList {
    entries: HashMap<RuleId, RuleModel>,
    order: Vec<RuleId>,
}

impl RuleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: &RuleId) -> Option<&RuleModel> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &RuleId) -> bool {
        self.entries.contains_key(id)
    }

    /// Rules in list order.
    pub fn iter(&self) -> impl Iterator<Item = &RuleModel> + '_ {
        self.order.iter().filter_map(move |id| self.entries.get(id))
    }

    pub fn ids(&self) -> &[RuleId] {
        &self.order
    }

    pub fn position(&self, id: &RuleId) -> Option<usize> {
        self.order.iter().position(|entry| entry == id)
    }

    /// Replaces an existing entry in place, or appends a new one.
    pub fn upsert(&mut self, rule: RuleModel) {
        if !self.entries.contains_key(&rule.id) {
            self.order.push(rule.id.clone());
        }
        self.entries.insert(rule.id.clone(), rule);
    }

    /// Removes exactly the entry with `id`. Returns it if present.
    pub fn remove(&mut self, id: &RuleId) -> Option<RuleModel> {
        let removed = self.entries.remove(id)?;
        self.order.retain(|entry| entry != id);
        Some(removed)
    }

    /// Moves an entry one slot up or down. No-op at the boundaries or for
    /// unknown ids. Returns whether the order changed.
    pub fn move_item(&mut self, id: &RuleId, down: bool) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        let target = if down {
            if index + 1 >= self.order.len() {
                return false;
            }
            index + 1
        } else {
            if index == 0 {
                return false;
            }
            index - 1
        };
        self.order.swap(index, target);
        true
    }

    pub fn to_vec(&self) -> Vec<RuleModel> {
        self.iter().cloned().collect()
    }
}

impl From<Vec<RuleModel>> for RuleList {
    /// Later duplicates of an id replace the earlier entry in its original slot.
    fn from(rules: Vec<RuleModel>) -> Self {
        let mut list = RuleList::new();
        for rule in rules {
            list.upsert(rule.sanitized());
        }
        list
    }
}

impl From<RuleList> for Vec<RuleModel> {
    fn from(list: RuleList) -> Self {
        list.to_vec()
    }
}

impl FromIterator<RuleModel> for RuleList {
    fn from_iter<T: IntoIterator<Item = RuleModel>>(iter: T) -> Self {
        RuleList::from(iter.into_iter().collect::<Vec<_>>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str) -> RuleModel {
        RuleModel::with_id(RuleId::from(id))
    }

    fn ids(list: &RuleList) -> Vec<&str> {
        list.ids().iter().map(|id| id.0.as_str()).collect()
    }

    #[test]
    fn test_new_rule_defaults() {
        let r = RuleModel::new();
        assert!(r.enabled);
        assert!(!r.initial_load_only);
        assert!(!r.strict);
        assert_eq!(r.match_type, MatchType::Contains);
        assert_eq!(r.pattern, "twitch.tv");
        assert_eq!(r.payload, RuleOverride::Speed(1.0));
        assert_ne!(RuleModel::new().id, r.id);
    }

    #[test]
    fn test_match_type_change_resets_pattern() {
        let r = rule("a").with_pattern("youtube.com");
        let regex = r.with_match_type(MatchType::Regex);
        assert_eq!(regex.pattern, r"twitch\.tv");
        let prefix = regex.with_match_type(MatchType::StartsWith);
        assert_eq!(prefix.pattern, "https://www.twitch.tv");
        let contains = prefix.with_match_type(MatchType::Contains);
        assert_eq!(contains.pattern, "twitch.tv");
        // original value untouched
        assert_eq!(r.pattern, "youtube.com");
    }

    #[test]
    fn test_same_match_type_keeps_pattern() {
        let r = rule("a").with_pattern("youtube.com");
        assert_eq!(r.with_match_type(MatchType::Contains).pattern, "youtube.com");
    }

    #[test]
    fn test_with_target_installs_default_payload() {
        let r = rule("a").with_override(RuleOverride::Speed(2.5));
        assert_eq!(r.with_target(TargetType::Speed).payload, RuleOverride::Speed(2.5));
        assert_eq!(r.with_target(TargetType::State).payload, RuleOverride::State(true));
        assert_eq!(
            r.with_target(TargetType::Fx).payload,
            RuleOverride::Fx(FxPair::default())
        );
    }

    #[test]
    fn test_speed_override_is_clamped() {
        let r = rule("a").with_override(RuleOverride::Speed(40.0));
        assert_eq!(r.payload, RuleOverride::Speed(16.0));
        let r = rule("a").with_override(RuleOverride::Speed(0.0));
        assert_eq!(r.payload, RuleOverride::Speed(1.0 / 16.0));
    }

    #[test]
    fn test_remove_keeps_relative_order() {
        let mut list: RuleList = ["a", "b", "c", "d"].into_iter().map(rule).collect();
        let removed = list.remove(&RuleId::from("b"));
        assert_eq!(removed.map(|r| r.id), Some(RuleId::from("b")));
        assert_eq!(ids(&list), vec!["a", "c", "d"]);
        assert!(list.remove(&RuleId::from("zzz")).is_none());
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_move_item_boundaries_are_noops() {
        let mut list: RuleList = ["a", "b", "c"].into_iter().map(rule).collect();
        assert!(!list.move_item(&RuleId::from("a"), false));
        assert!(!list.move_item(&RuleId::from("c"), true));
        assert!(!list.move_item(&RuleId::from("zzz"), true));
        assert_eq!(ids(&list), vec!["a", "b", "c"]);

        assert!(list.move_item(&RuleId::from("a"), true));
        assert_eq!(ids(&list), vec!["b", "a", "c"]);
        assert!(list.move_item(&RuleId::from("c"), false));
        assert_eq!(ids(&list), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut list: RuleList = ["a", "b"].into_iter().map(rule).collect();
        list.upsert(rule("a").with_enabled(false));
        list.upsert(rule("c"));
        assert_eq!(ids(&list), vec!["a", "b", "c"]);
        assert_eq!(list.get(&RuleId::from("a")).map(|r| r.enabled), Some(false));
    }

    #[test]
    fn test_serializes_as_ordered_array() {
        let list: RuleList = ["b", "a"].into_iter().map(rule).collect();
        let json = serde_json::to_value(&list).unwrap();
        let array = json.as_array().unwrap();
        assert_eq!(array[0]["id"], "b");
        assert_eq!(array[0]["matchType"], "CONTAINS");
        assert_eq!(array[0]["match"], "twitch.tv");
        assert_eq!(array[0]["override"]["type"], "SPEED");

        let back: RuleList = serde_json::from_value(json).unwrap();
        assert_eq!(back, list);
    }
}
