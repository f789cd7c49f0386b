//! The authoritative document
//!
//! Global settings, the ordered rule list and the per-tab resolved state.
//! Tab entries are always recomputed from their inputs (URL history, manual
//! override) against the current settings and rules; they are never edited
//! field by field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::engine::{ResolvedOverrides, Resolver};
use crate::fx::FxPair;
use crate::rule::{RuleId, RuleList};
use crate::types::{clamp_speed, TabId, SPEED_DEFAULT};

// =============================================================================
// Global Settings
// =============================================================================

pub const DEFAULT_SPEED_PRESETS: [f64; 12] =
    [0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0, 2.5, 3.0, 3.5, 4.0];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct GlobalSettings {
    /// Extension enabled flag; the default for tabs without a STATE override.
    pub enabled: bool,
    /// While set, manual tab overrides survive navigation.
    pub is_pinned: bool,
    /// Default playback speed for tabs without a SPEED override.
    pub speed: f64,
    pub speed_presets: Vec<f64>,
    /// Default fx for tabs without an FX override.
    pub fx: FxPair,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            is_pinned: false,
            speed: SPEED_DEFAULT,
            speed_presets: DEFAULT_SPEED_PRESETS.to_vec(),
            fx: FxPair::default(),
        }
    }
}

// =============================================================================
// Manual Overrides
// =============================================================================

/// Values set directly against one tab (popup controls, shortcuts). They
/// beat rule overrides field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct ManualOverride {
    pub enabled: Option<bool>,
    pub speed: Option<f64>,
    pub fx: Option<FxPair>,
    /// Survives navigation of the tab.
    pub sticky: bool,
}

impl ManualOverride {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.speed.is_none() && self.fx.is_none()
    }

    pub fn sanitized(self) -> Self {
        Self {
            speed: self.speed.map(clamp_speed),
            ..self
        }
    }
}

// =============================================================================
// Provenance
// =============================================================================

/// Where an effective tab value came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", content = "rule", rename_all = "camelCase")]
#[ts(export)]
pub enum Source {
    #[default]
    Default,
    Rule(RuleId),
    Manual,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Provenance {
    pub enabled: Source,
    pub speed: Source,
    pub fx: Source,
}

// =============================================================================
// Tab State
// =============================================================================

/// Resolved runtime state of one tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TabState {
    /// Current URL.
    pub url: String,
    /// URL of the last observed initial load.
    pub load_url: Option<String>,
    /// Set once the tab navigated in-page since its last initial load.
    pub in_page: bool,
    pub manual: ManualOverride,
    pub enabled: bool,
    pub speed: f64,
    pub fx: FxPair,
    pub provenance: Provenance,
}

impl TabState {
    /// A tab first observed at `url`.
    pub fn observed(url: &str, initial_load: bool) -> Self {
        Self {
            url: url.to_string(),
            load_url: initial_load.then(|| url.to_string()),
            in_page: !initial_load,
            manual: ManualOverride::default(),
            enabled: true,
            speed: SPEED_DEFAULT,
            fx: FxPair::default(),
            provenance: Provenance::default(),
        }
    }

    /// Records a navigation. Non-sticky manual overrides are dropped unless
    /// `keep_manual` is set. Returns false for a duplicate in-page event to
    /// the current URL, which changes nothing.
    pub fn navigate(&mut self, url: &str, initial_load: bool, keep_manual: bool) -> bool {
        if !initial_load && self.url == url {
            return false;
        }
        self.url = url.to_string();
        if initial_load {
            self.load_url = Some(url.to_string());
            self.in_page = false;
        } else {
            self.in_page = true;
        }
        if !keep_manual && !self.manual.sticky {
            self.manual = ManualOverride::default();
        }
        true
    }

    /// Recomputes the effective fields: manual, then rule, then global default.
    pub fn refresh(&mut self, settings: &GlobalSettings, resolver: &Resolver) {
        let resolved = resolver.resolve_tab(self.load_url.as_deref(), &self.url, self.in_page);
        self.apply(settings, resolved);
    }

    fn apply(&mut self, settings: &GlobalSettings, resolved: ResolvedOverrides) {
        let (enabled, enabled_source) = pick(
            self.manual.enabled,
            resolved.state.map(|r| (r.value, r.rule)),
            settings.enabled,
        );
        let (speed, speed_source) = pick(
            self.manual.speed,
            resolved.speed.map(|r| (r.value, r.rule)),
            settings.speed,
        );
        let (fx, fx_source) = pick(
            self.manual.fx.clone(),
            resolved.fx.map(|r| (r.value, r.rule)),
            settings.fx.clone(),
        );
        self.enabled = enabled;
        self.speed = speed;
        self.fx = fx;
        self.provenance = Provenance {
            enabled: enabled_source,
            speed: speed_source,
            fx: fx_source,
        };
    }

    /// Installs a manual override and applies the values it sets. Returns
    /// `None` when the new override drops a field the current one sets: the
    /// value underneath comes from rules and settings, which only a full
    /// refresh can resolve.
    pub fn with_manual(&self, manual: ManualOverride) -> Option<TabState> {
        let current = &self.manual;
        if (current.enabled.is_some() && manual.enabled.is_none())
            || (current.speed.is_some() && manual.speed.is_none())
            || (current.fx.is_some() && manual.fx.is_none())
        {
            return None;
        }

        let mut next = self.clone();
        if let Some(enabled) = manual.enabled {
            next.enabled = enabled;
            next.provenance.enabled = Source::Manual;
        }
        if let Some(speed) = manual.speed {
            next.speed = speed;
            next.provenance.speed = Source::Manual;
        }
        if let Some(fx) = &manual.fx {
            next.fx = fx.clone();
            next.provenance.fx = Source::Manual;
        }
        next.manual = manual;
        Some(next)
    }
}

fn pick<T>(manual: Option<T>, rule: Option<(T, RuleId)>, default: T) -> (T, Source) {
    if let Some(value) = manual {
        return (value, Source::Manual);
    }
    match rule {
        Some((value, id)) => (value, Source::Rule(id)),
        None => (default, Source::Default),
    }
}

// =============================================================================
// Document
// =============================================================================

/// The single authoritative state. Only settings and rules are persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub settings: GlobalSettings,
    #[serde(default)]
    pub rules: RuleList,
    #[serde(skip)]
    pub tabs: BTreeMap<TabId, TabState>,
}

impl Document {
    pub fn tab(&self, tab: TabId) -> Option<&TabState> {
        self.tabs.get(&tab)
    }

    /// Recomputes every tab against the current settings and rules.
    pub fn refresh_tabs(&mut self, resolver: &Resolver) {
        for tab in self.tabs.values_mut() {
            tab.refresh(&self.settings, resolver);
        }
    }
}
