//! JSON-in, JSON-out helpers behind the exported functions. Errors are
//! plain strings so they can be checked without a JS runtime.

use serde::de::DeserializeOwned;
use serde::Serialize;

use tempo_core::engine::{check_rules as check_rule_list, resolve, Resolver};
use tempo_core::fx::FxPair;
use tempo_core::rule::{MatchType, RuleModel, TargetType};

pub(crate) fn parse<T: DeserializeOwned>(json: &str, what: &str) -> Result<T, String> {
    serde_json::from_str(json).map_err(|e| format!("Invalid {}: {}", what, e))
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("Failed to encode result: {}", e))
}

pub fn resolve_rules(rules_json: &str, url: &str, is_initial_load: bool) -> Result<String, String> {
    let rules: Vec<RuleModel> = parse(rules_json, "rule list")?;
    to_json(&resolve(&rules, url, is_initial_load))
}

/// Resolution for a tab that loaded `load_url` and may have navigated
/// in-page to `url` since.
pub fn resolve_tab(
    rules_json: &str,
    load_url: Option<&str>,
    url: &str,
    in_page: bool,
) -> Result<String, String> {
    let rules: Vec<RuleModel> = parse(rules_json, "rule list")?;
    to_json(&Resolver::new(&rules).resolve_tab(load_url, url, in_page))
}

pub fn new_rule() -> Result<String, String> {
    to_json(&RuleModel::new())
}

pub fn with_match_type(rule_json: &str, match_type: &str) -> Result<String, String> {
    let rule: RuleModel = parse(rule_json, "rule")?;
    let match_type =
        MatchType::parse(match_type).ok_or_else(|| format!("Unknown match type '{}'", match_type))?;
    to_json(&rule.with_match_type(match_type))
}

pub fn with_target(rule_json: &str, target: &str) -> Result<String, String> {
    let rule: RuleModel = parse(rule_json, "rule")?;
    let target = TargetType::parse(target).ok_or_else(|| format!("Unknown target '{}'", target))?;
    to_json(&rule.with_target(target))
}

pub fn check_rules(rules_json: &str) -> Result<Vec<String>, String> {
    let rules: Vec<RuleModel> = parse(rules_json, "rule list")?;
    Ok(check_rule_list(&rules).iter().map(ToString::to_string).collect())
}

pub fn swap_fx(pair_json: &str) -> Result<String, String> {
    let pair: FxPair = parse(pair_json, "fx pair")?;
    to_json(&pair.swap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_core::engine::ResolvedOverrides;
    use tempo_core::rule::{RuleId, RuleOverride};

    fn rules_json() -> String {
        let rules = vec![
            RuleModel::with_id(RuleId::from("a"))
                .with_pattern("twitch.tv")
                .with_override(RuleOverride::Speed(2.0)),
            RuleModel::with_id(RuleId::from("b"))
                .with_match_type(MatchType::Regex)
                .with_pattern("(")
                .with_target(TargetType::State),
        ];
        serde_json::to_string(&rules).unwrap()
    }

    #[test]
    fn test_resolve_rules_json() {
        let out = resolve_rules(&rules_json(), "https://www.twitch.tv/x", true).unwrap();
        let resolved: ResolvedOverrides = serde_json::from_str(&out).unwrap();
        assert_eq!(resolved.speed.map(|r| r.value), Some(2.0));
        assert!(resolved.state.is_none());
    }

    #[test]
    fn test_resolve_tab_uses_load_url() {
        let load_url = Some("https://twitch.tv/");
        let out = resolve_tab(&rules_json(), load_url, "https://other.com/", true).unwrap();
        let resolved: ResolvedOverrides = serde_json::from_str(&out).unwrap();
        assert_eq!(resolved.speed.map(|r| r.rule), Some(RuleId::from("a")));
    }

    #[test]
    fn test_rule_edits() {
        let rule = new_rule().unwrap();
        let regex: RuleModel = parse(&with_match_type(&rule, "REGEX").unwrap(), "rule").unwrap();
        assert_eq!(regex.pattern, r"twitch\.tv");
        let state: RuleModel = parse(&with_target(&rule, "state").unwrap(), "rule").unwrap();
        assert_eq!(state.payload, RuleOverride::State(true));
        assert!(with_target(&rule, "volume").is_err());
    }

    #[test]
    fn test_check_rules_reports_invalid_regex() {
        let problems = check_rules(&rules_json()).unwrap();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("invalid regex"));
        assert!(check_rules("not json").unwrap_err().starts_with("Invalid rule list"));
    }

    #[test]
    fn test_swap_fx_twice_is_identity() {
        let pair = serde_json::to_string(&FxPair::default().with_side(
            tempo_core::fx::FxSide::Element,
            tempo_core::fx::Fx::default().with_enabled(true),
        ))
        .unwrap();
        let swapped = swap_fx(&pair).unwrap();
        assert_ne!(swapped, pair);
        assert_eq!(swap_fx(&swapped).unwrap(), pair);
    }
}
