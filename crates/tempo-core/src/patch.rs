//! Patches: partial document updates
//!
//! A patch replaces whole entities: a settings field, a rule entry, a tab's
//! manual override. Merging never recurses below that level.

use std::collections::BTreeSet;

use log::debug;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::document::{Document, GlobalSettings, ManualOverride, TabState};
use crate::engine::Resolver;
use crate::fx::FxPair;
use crate::rule::{RuleId, RuleList, RuleModel};
use crate::types::{clamp_speed, TabId, ViewMask};

// =============================================================================
// Patch Types
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct SettingsPatch {
    pub enabled: Option<bool>,
    pub is_pinned: Option<bool>,
    pub speed: Option<f64>,
    pub speed_presets: Option<Vec<f64>>,
    pub fx: Option<FxPair>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none()
            && self.is_pinned.is_none()
            && self.speed.is_none()
            && self.speed_presets.is_none()
            && self.fx.is_none()
    }

    /// Fields this patch writes.
    pub fn fields(&self) -> ViewMask {
        let mut fields = ViewMask::empty();
        fields.set(ViewMask::ENABLED, self.enabled.is_some());
        fields.set(ViewMask::PINNED, self.is_pinned.is_some());
        fields.set(ViewMask::SPEED, self.speed.is_some());
        fields.set(ViewMask::PRESETS, self.speed_presets.is_some());
        fields.set(ViewMask::FX, self.fx.is_some());
        fields
    }
}

/// One edit against the rule list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "op", rename_all = "camelCase")]
#[ts(export)]
pub enum RuleEdit {
    /// Replace the entry with the same id wholesale, or append it.
    Upsert { rule: RuleModel },
    Remove { id: RuleId },
    /// Move one slot down (or up). No-op at the list boundaries.
    Move { id: RuleId, down: bool },
    /// Replace the whole list.
    Replace { rules: Vec<RuleModel> },
}

impl RuleEdit {
    /// Applies the edit. Returns whether the list changed.
    pub fn apply_to(&self, list: &mut RuleList) -> bool {
        match self {
            RuleEdit::Upsert { rule } => {
                let rule = rule.clone().sanitized();
                if list.get(&rule.id) == Some(&rule) {
                    return false;
                }
                list.upsert(rule);
                true
            }
            RuleEdit::Remove { id } => list.remove(id).is_some(),
            RuleEdit::Move { id, down } => list.move_item(id, *down),
            RuleEdit::Replace { rules } => {
                let next = RuleList::from(rules.clone());
                if next.to_vec() == list.to_vec() {
                    return false;
                }
                *list = next;
                true
            }
        }
    }
}

/// One edit against a tab entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "op", rename_all = "camelCase")]
#[ts(export)]
pub enum TabEdit {
    /// URL change reported by the tab's content script. Creates the entry on
    /// first observation.
    #[serde(rename_all = "camelCase")]
    Navigate {
        tab: TabId,
        url: String,
        initial_load: bool,
    },
    /// Replace the tab's manual override wholesale.
    SetOverride { tab: TabId, manual: ManualOverride },
    ClearOverride { tab: TabId },
    Close { tab: TabId },
}

impl TabEdit {
    pub fn tab(&self) -> TabId {
        match self {
            TabEdit::Navigate { tab, .. }
            | TabEdit::SetOverride { tab, .. }
            | TabEdit::ClearOverride { tab }
            | TabEdit::Close { tab } => *tab,
        }
    }
}

/// A partial document update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(default)]
#[ts(export)]
pub struct Patch {
    pub settings: SettingsPatch,
    pub rules: Vec<RuleEdit>,
    pub tabs: Vec<TabEdit>,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.settings.is_empty() && self.rules.is_empty() && self.tabs.is_empty()
    }

    pub fn settings(settings: SettingsPatch) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn rule(edit: RuleEdit) -> Self {
        Self {
            rules: vec![edit],
            ..Default::default()
        }
    }

    pub fn tab(edit: TabEdit) -> Self {
        Self {
            tabs: vec![edit],
            ..Default::default()
        }
    }

    pub fn navigate(tab: TabId, url: &str, initial_load: bool) -> Self {
        Self::tab(TabEdit::Navigate {
            tab,
            url: url.to_string(),
            initial_load,
        })
    }
}

// =============================================================================
// Merge
// =============================================================================

/// What a merged patch changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    /// Fields whose value differs from before the patch.
    pub fields: ViewMask,
    /// Tabs whose entry changed, was created or was removed.
    pub tabs: BTreeSet<TabId>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether the persisted part of the document (settings, rules) changed.
    pub fn touches_persisted(&self) -> bool {
        self.fields.intersects(ViewMask::SETTINGS | ViewMask::RULES)
    }
}

impl Document {
    /// Merges `patch`, re-deriving affected tabs in the same step. `resolver`
    /// must be compiled from `self.rules`; it is rebuilt when the rules change.
    pub fn apply_patch(&mut self, patch: Patch, resolver: &mut Resolver) -> Changes {
        let before_settings = self.settings.clone();
        let before_tabs = self.tabs.clone();

        let settings = patch.settings;
        if let Some(enabled) = settings.enabled {
            self.settings.enabled = enabled;
        }
        if let Some(is_pinned) = settings.is_pinned {
            self.settings.is_pinned = is_pinned;
        }
        if let Some(speed) = settings.speed {
            self.settings.speed = clamp_speed(speed);
        }
        if let Some(presets) = settings.speed_presets {
            self.settings.speed_presets = presets.into_iter().map(clamp_speed).collect();
        }
        if let Some(fx) = settings.fx {
            self.settings.fx = fx;
        }

        let mut rules_changed = false;
        for edit in &patch.rules {
            rules_changed |= edit.apply_to(&mut self.rules);
        }
        if rules_changed {
            *resolver = Resolver::new(self.rules.iter());
        }

        let mut touched = BTreeSet::new();
        for edit in patch.tabs {
            touched.insert(edit.tab());
            self.apply_tab_edit(edit);
        }

        let mut fields = settings_diff(&before_settings, &self.settings);
        if rules_changed {
            fields |= ViewMask::RULES;
        }

        let refresh_all = rules_changed || !fields.is_empty();
        for (id, tab) in self.tabs.iter_mut() {
            if refresh_all || touched.contains(id) {
                tab.refresh(&self.settings, resolver);
            }
        }

        let tabs: BTreeSet<TabId> = before_tabs
            .keys()
            .chain(self.tabs.keys())
            .copied()
            .filter(|id| before_tabs.get(id) != self.tabs.get(id))
            .collect();
        if !tabs.is_empty() {
            fields |= ViewMask::TAB;
        }

        Changes { fields, tabs }
    }

    fn apply_tab_edit(&mut self, edit: TabEdit) {
        let keep_manual = self.settings.is_pinned;
        match edit {
            TabEdit::Navigate {
                tab,
                url,
                initial_load,
            } => match self.tabs.get_mut(&tab) {
                Some(state) => {
                    state.navigate(&url, initial_load, keep_manual);
                }
                None => {
                    self.tabs.insert(tab, TabState::observed(&url, initial_load));
                }
            },
            TabEdit::SetOverride { tab, manual } => match self.tabs.get_mut(&tab) {
                Some(state) => state.manual = manual.sanitized(),
                None => debug!("override for unknown tab {} ignored", tab),
            },
            TabEdit::ClearOverride { tab } => {
                if let Some(state) = self.tabs.get_mut(&tab) {
                    state.manual = ManualOverride::default();
                }
            }
            TabEdit::Close { tab } => {
                self.tabs.remove(&tab);
            }
        }
    }
}

fn settings_diff(before: &GlobalSettings, after: &GlobalSettings) -> ViewMask {
    let mut fields = ViewMask::empty();
    fields.set(ViewMask::ENABLED, before.enabled != after.enabled);
    fields.set(ViewMask::PINNED, before.is_pinned != after.is_pinned);
    fields.set(ViewMask::SPEED, before.speed != after.speed);
    fields.set(ViewMask::PRESETS, before.speed_presets != after.speed_presets);
    fields.set(ViewMask::FX, before.fx != after.fx);
    fields
}
