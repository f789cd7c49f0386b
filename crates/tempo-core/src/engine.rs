//! Rule resolution engine
//!
//! Pure function from {ordered rules, URL, load kind} to the overrides in
//! force. For every target type independently, the last eligible rule in
//! list order whose predicate accepts the URL wins.
//!
//! A [`Resolver`] compiles a rule list once (regexes included) and can then
//! resolve any number of URLs. It holds no state besides the compiled rules,
//! so identical inputs always give identical outputs.

use log::debug;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::fx::FxPair;
use crate::rule::{MatchType, RuleError, RuleId, RuleModel, RuleOverride, TargetType};
use crate::types::{SPEED_MAX, SPEED_MIN};

/// Upper bound on compiled regex size, so one hostile pattern can't blow up memory.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

// =============================================================================
// Resolution Output
// =============================================================================

/// A winning override and the rule it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Resolved<T> {
    pub rule: RuleId,
    pub value: T,
}

/// Per-target resolution result. `None` means no rule of that type matched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ResolvedOverrides {
    pub state: Option<Resolved<bool>>,
    pub speed: Option<Resolved<f64>>,
    pub fx: Option<Resolved<FxPair>>,
}

impl ResolvedOverrides {
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.speed.is_none() && self.fx.is_none()
    }

    /// Fills every absent type from `fallback`.
    pub fn or(self, fallback: ResolvedOverrides) -> ResolvedOverrides {
        ResolvedOverrides {
            state: self.state.or(fallback.state),
            speed: self.speed.or(fallback.speed),
            fx: self.fx.or(fallback.fx),
        }
    }

    fn is_filled(&self, target: TargetType) -> bool {
        match target {
            TargetType::State => self.state.is_some(),
            TargetType::Speed => self.speed.is_some(),
            TargetType::Fx => self.fx.is_some(),
        }
    }

    fn is_complete(&self) -> bool {
        self.state.is_some() && self.speed.is_some() && self.fx.is_some()
    }

    fn fill(&mut self, rule: RuleId, payload: &RuleOverride) {
        match payload {
            RuleOverride::State(value) => {
                self.state = Some(Resolved { rule, value: *value })
            }
            RuleOverride::Speed(value) => {
                self.speed = Some(Resolved { rule, value: *value })
            }
            RuleOverride::Fx(value) => {
                self.fx = Some(Resolved {
                    rule,
                    value: value.clone(),
                })
            }
        }
    }
}

// =============================================================================
// Compiled Rules
// =============================================================================

#[derive(Debug, Clone)]
enum Predicate {
    Prefix(String),
    Substring(String),
    Regex(Regex),
    /// Pattern failed to compile; the rule never matches.
    Never,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    id: RuleId,
    initial_load_only: bool,
    /// Lax comparison: literals are stored lowercased and compared against the lowercased URL.
    fold_case: bool,
    predicate: Predicate,
    payload: RuleOverride,
}

impl CompiledRule {
    fn compile(rule: &RuleModel) -> Self {
        let fold_case = !rule.strict;
        let literal = |pattern: &str| {
            if fold_case {
                pattern.to_lowercase()
            } else {
                pattern.to_string()
            }
        };
        let predicate = match rule.match_type {
            MatchType::StartsWith => Predicate::Prefix(literal(&rule.pattern)),
            MatchType::Contains => Predicate::Substring(literal(&rule.pattern)),
            MatchType::Regex => match build_regex(&rule.pattern, fold_case) {
                Ok(regex) => Predicate::Regex(regex),
                Err(e) => {
                    debug!("rule {} skipped, invalid regex: {}", rule.id, e);
                    Predicate::Never
                }
            },
        };
        Self {
            id: rule.id.clone(),
            initial_load_only: rule.initial_load_only,
            fold_case,
            predicate,
            payload: rule.payload.clone(),
        }
    }

    #[inline]
    fn matches(&self, url: &str, url_folded: &str) -> bool {
        let subject = if self.fold_case { url_folded } else { url };
        match &self.predicate {
            Predicate::Prefix(prefix) => subject.starts_with(prefix.as_str()),
            Predicate::Substring(needle) => subject.contains(needle.as_str()),
            // case folding is built into the regex itself
            Predicate::Regex(regex) => regex.is_match(url),
            Predicate::Never => false,
        }
    }
}

fn build_regex(pattern: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
}

// =============================================================================
// Resolver
// =============================================================================

/// A rule list compiled for repeated resolution.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    rules: Vec<CompiledRule>,
}

impl Resolver {
    /// Compiles the enabled rules, keeping list order.
    pub fn new<'a, I>(rules: I) -> Self
    where
        I: IntoIterator<Item = &'a RuleModel>,
    {
        Self {
            rules: rules
                .into_iter()
                .filter(|rule| rule.enabled)
                .map(CompiledRule::compile)
                .collect(),
        }
    }

    /// Number of compiled (enabled) rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Overrides in force for `url`. ILO rules are only eligible when
    /// `is_initial_load` is set.
    pub fn resolve(&self, url: &str, is_initial_load: bool) -> ResolvedOverrides {
        let url_folded = url.to_lowercase();
        let mut out = ResolvedOverrides::default();

        // Walk backwards: the first hit per type is the last one in list order.
        for rule in self.rules.iter().rev() {
            if rule.initial_load_only && !is_initial_load {
                continue;
            }
            if out.is_filled(rule.payload.target()) {
                continue;
            }
            if rule.matches(url, &url_folded) {
                out.fill(rule.id.clone(), &rule.payload);
                if out.is_complete() {
                    break;
                }
            }
        }

        out
    }

    /// Overrides for a tab that loaded `load_url` and, if `in_page`, has since
    /// navigated in-page to `url`. In-page results win per type; types with
    /// no in-page match keep what the initial load resolved.
    pub fn resolve_tab(
        &self,
        load_url: Option<&str>,
        url: &str,
        in_page: bool,
    ) -> ResolvedOverrides {
        let on_load = load_url
            .map(|load_url| self.resolve(load_url, true))
            .unwrap_or_default();
        if !in_page {
            return on_load;
        }
        self.resolve(url, false).or(on_load)
    }
}

/// Compiles `rules` and resolves `url` once.
pub fn resolve<'a, I>(rules: I, url: &str, is_initial_load: bool) -> ResolvedOverrides
where
    I: IntoIterator<Item = &'a RuleModel>,
{
    Resolver::new(rules).resolve(url, is_initial_load)
}

// =============================================================================
// Rule Checks
// =============================================================================

/// Problems in a single rule. An empty result means the rule is well formed.
pub fn check_rule(rule: &RuleModel) -> Vec<RuleError> {
    let mut errors = Vec::new();

    if rule.pattern.is_empty() {
        errors.push(RuleError::EmptyPattern { id: rule.id.clone() });
    }

    if rule.match_type == MatchType::Regex {
        if let Err(e) = build_regex(&rule.pattern, !rule.strict) {
            errors.push(RuleError::InvalidRegex {
                id: rule.id.clone(),
                message: e.to_string(),
            });
        }
    }

    if let RuleOverride::Speed(speed) = rule.payload {
        if !(SPEED_MIN..=SPEED_MAX).contains(&speed) {
            errors.push(RuleError::SpeedOutOfRange {
                id: rule.id.clone(),
                speed,
            });
        }
    }

    errors
}

/// Checks every rule plus id uniqueness across the list.
pub fn check_rules(rules: &[RuleModel]) -> Vec<RuleError> {
    let mut errors = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for rule in rules {
        if !seen.insert(&rule.id) {
            errors.push(RuleError::DuplicateId(rule.id.clone()));
        }
        errors.extend(check_rule(rule));
    }
    errors
}
