//! Views: field-masked projections of the document
//!
//! The authority sends [`Delta`]s; each consumer context folds them into a
//! [`Projection`], which holds:
//!
//! - `confirmed`: the last values the authority reported
//! - the local writes not yet confirmed, in write order
//!
//! Readers see the writes replayed over the confirmed view. When the
//! authority confirms a write it is dropped and the confirmed value shows
//! through. If the two disagree, another writer won the race and the
//! authority's value wins (a "snap back").

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::document::{Document, ManualOverride, TabState};
use crate::fx::FxPair;
use crate::patch::{Patch, TabEdit};
use crate::rule::{RuleList, RuleModel};
use crate::types::{clamp_speed, TabId, ViewKey, ViewMask};

/// Single-field masks, in field order.
pub const FIELDS: [ViewMask; 7] = [
    ViewMask::ENABLED,
    ViewMask::PINNED,
    ViewMask::SPEED,
    ViewMask::PRESETS,
    ViewMask::FX,
    ViewMask::RULES,
    ViewMask::TAB,
];

fn each_field(mask: ViewMask) -> impl Iterator<Item = ViewMask> {
    FIELDS.into_iter().filter(move |field| mask.contains(*field))
}

// =============================================================================
// View
// =============================================================================

/// A partial copy of the document. Which fields are meaningful is carried
/// next to it (see [`Delta::fields`]); for `TAB` a `None` means the tab is
/// gone or was never observed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct View {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_presets: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fx: Option<FxPair>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<RuleModel>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab: Option<TabState>,
}

impl View {
    /// Projects `fields` of `doc`. `TAB` reads the entry of `tab`.
    pub fn project(doc: &Document, fields: ViewMask, tab: Option<TabId>) -> View {
        let settings = &doc.settings;
        let mut view = View::default();
        for field in each_field(fields) {
            if field == ViewMask::ENABLED {
                view.enabled = Some(settings.enabled);
            } else if field == ViewMask::PINNED {
                view.is_pinned = Some(settings.is_pinned);
            } else if field == ViewMask::SPEED {
                view.speed = Some(settings.speed);
            } else if field == ViewMask::PRESETS {
                view.speed_presets = Some(settings.speed_presets.clone());
            } else if field == ViewMask::FX {
                view.fx = Some(settings.fx.clone());
            } else if field == ViewMask::RULES {
                view.rules = Some(doc.rules.to_vec());
            } else if field == ViewMask::TAB {
                view.tab = tab.and_then(|id| doc.tab(id)).cloned();
            }
        }
        view
    }

    /// Copies `fields` from `other`, including absent values.
    pub fn overlay(&mut self, other: &View, fields: ViewMask) {
        for field in each_field(fields) {
            if field == ViewMask::ENABLED {
                self.enabled = other.enabled;
            } else if field == ViewMask::PINNED {
                self.is_pinned = other.is_pinned;
            } else if field == ViewMask::SPEED {
                self.speed = other.speed;
            } else if field == ViewMask::PRESETS {
                self.speed_presets = other.speed_presets.clone();
            } else if field == ViewMask::FX {
                self.fx = other.fx.clone();
            } else if field == ViewMask::RULES {
                self.rules = other.rules.clone();
            } else if field == ViewMask::TAB {
                self.tab = other.tab.clone();
            }
        }
    }

    /// Fields among `fields` whose values differ between the two views.
    pub fn diff(&self, other: &View, fields: ViewMask) -> ViewMask {
        let mut out = ViewMask::empty();
        for field in each_field(fields) {
            let differs = if field == ViewMask::ENABLED {
                self.enabled != other.enabled
            } else if field == ViewMask::PINNED {
                self.is_pinned != other.is_pinned
            } else if field == ViewMask::SPEED {
                self.speed != other.speed
            } else if field == ViewMask::PRESETS {
                self.speed_presets != other.speed_presets
            } else if field == ViewMask::FX {
                self.fx != other.fx
            } else if field == ViewMask::RULES {
                self.rules != other.rules
            } else {
                self.tab != other.tab
            };
            out.set(field, differs);
        }
        out
    }
}

// =============================================================================
// Delta
// =============================================================================

/// A revision-stamped partial view sent by the authority: the initial
/// snapshot of a subscription or the changed subset after a patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Delta {
    pub revision: u64,
    #[ts(type = "string")]
    pub fields: ViewMask,
    pub view: View,
    /// Local write sequence of the receiving subscription confirmed by this delta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirms: Option<u64>,
}

// =============================================================================
// Projection
// =============================================================================

/// Outcome of folding a delta into a projection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciled {
    /// Fields whose visible value changed.
    pub changed: ViewMask,
    /// Pending local values the authority overrode.
    pub snapped_back: ViewMask,
    /// The delta was older than what the projection already holds.
    pub stale: bool,
}

/// A consumer's local copy of its view, with optimistic pending writes.
///
/// Unconfirmed writes are kept as patches and replayed, in order, over the
/// confirmed view on every read. A write issued before the snapshot therefore
/// lands on the snapshot once it arrives rather than on an empty view.
#[derive(Debug, Clone)]
pub struct Projection {
    key: ViewKey,
    revision: Option<u64>,
    confirmed: View,
    writes: Vec<(u64, Patch)>,
}

impl Projection {
    pub fn new(key: ViewKey) -> Self {
        Self::with_fallback(key, View::default())
    }

    /// Starts from a last-known view, used while the authority is unreachable.
    pub fn with_fallback(key: ViewKey, last_known: View) -> Self {
        Self {
            key,
            revision: None,
            confirmed: last_known,
            writes: Vec::new(),
        }
    }

    pub fn key(&self) -> ViewKey {
        self.key
    }

    /// Revision of the last delta folded in, `None` before the first snapshot.
    pub fn revision(&self) -> Option<u64> {
        self.revision
    }

    /// Fields currently showing a local value the authority has not confirmed.
    pub fn pending_fields(&self) -> ViewMask {
        self.replay()
            .1
            .into_iter()
            .fold(ViewMask::empty(), |acc, fields| acc | fields)
    }

    /// Number of local writes still waiting for confirmation.
    pub fn unconfirmed(&self) -> usize {
        self.writes.len()
    }

    pub fn confirmed(&self) -> &View {
        &self.confirmed
    }

    /// The view as the consumer should see it: pending over confirmed.
    pub fn current(&self) -> View {
        self.replay().0
    }

    fn replay(&self) -> (View, Vec<ViewMask>) {
        let mut view = self.confirmed.clone();
        let touched = self
            .writes
            .iter()
            .map(|(_, patch)| apply_write(self.key, &mut view, patch))
            .collect();
        (view, touched)
    }

    /// Installs the subscription snapshot. Pending writes are replayed on top.
    pub fn apply_snapshot(&mut self, snapshot: &Delta) -> ViewMask {
        let before = self.current();
        self.confirmed = View::default();
        self.confirmed
            .overlay(&snapshot.view, snapshot.fields & self.key.effective_mask());
        self.revision = Some(snapshot.revision);
        before.diff(&self.current(), ViewMask::ALL)
    }

    /// Folds in a delta. Deltas at or below the current revision are ignored,
    /// so a consumer never moves back in time.
    pub fn reconcile(&mut self, delta: &Delta) -> Reconciled {
        if self.revision.is_some_and(|revision| delta.revision <= revision) {
            return Reconciled {
                stale: true,
                ..Default::default()
            };
        }

        let (before, touched) = self.replay();
        self.confirmed
            .overlay(&delta.view, delta.fields & self.key.effective_mask());
        self.revision = Some(delta.revision);

        // A confirming delta is the first one to include the confirmed writes,
        // so `before` is exactly what they were expected to produce.
        let mut settled = ViewMask::empty();
        if let Some(seq) = delta.confirms {
            let mut open = ViewMask::empty();
            for ((write_seq, _), fields) in self.writes.iter().zip(touched) {
                if *write_seq <= seq {
                    settled |= fields;
                } else {
                    open |= fields;
                }
            }
            settled -= open;
            self.writes.retain(|(write_seq, _)| *write_seq > seq);
        }

        let after = self.current();
        Reconciled {
            changed: before.diff(&after, ViewMask::ALL),
            snapped_back: before.diff(&after, settled),
            stale: false,
        }
    }

    /// Records `patch` as local write `seq` and applies it to the visible
    /// view. Returns the fields it changed locally; that can be empty before
    /// the snapshot, in which case the write still replays once it arrives.
    pub fn apply_local(&mut self, patch: &Patch, seq: u64) -> ViewMask {
        if reach(self.key, patch).is_empty() {
            return ViewMask::empty();
        }
        let mut view = self.current();
        let touched = apply_write(self.key, &mut view, patch);
        self.writes.push((seq, patch.clone()));
        touched
    }
}

/// Fields of `key` a patch could change locally.
fn reach(key: ViewKey, patch: &Patch) -> ViewMask {
    let settings = &patch.settings;
    let mut fields = ViewMask::empty();
    fields.set(ViewMask::ENABLED, settings.enabled.is_some());
    fields.set(ViewMask::PINNED, settings.is_pinned.is_some());
    fields.set(ViewMask::SPEED, settings.speed.is_some());
    fields.set(ViewMask::PRESETS, settings.speed_presets.is_some());
    fields.set(ViewMask::FX, settings.fx.is_some());
    fields.set(ViewMask::RULES, !patch.rules.is_empty());
    let own_tab = patch.tabs.iter().any(|edit| {
        Some(edit.tab()) == key.tab && !matches!(edit, TabEdit::Navigate { .. })
    });
    fields.set(ViewMask::TAB, own_tab);
    fields & key.effective_mask()
}

/// Applies what can be computed locally: settings, rule edits once the rules
/// are known, and manual overrides or closing of the view's own tab.
/// Navigation and overrides that need a refresh wait for the authority.
fn apply_write(key: ViewKey, view: &mut View, patch: &Patch) -> ViewMask {
    let mask = key.effective_mask();
    let mut touched = ViewMask::empty();

    let settings = &patch.settings;
    if let (Some(enabled), true) = (settings.enabled, mask.contains(ViewMask::ENABLED)) {
        view.enabled = Some(enabled);
        touched |= ViewMask::ENABLED;
    }
    if let (Some(is_pinned), true) = (settings.is_pinned, mask.contains(ViewMask::PINNED)) {
        view.is_pinned = Some(is_pinned);
        touched |= ViewMask::PINNED;
    }
    if let (Some(speed), true) = (settings.speed, mask.contains(ViewMask::SPEED)) {
        view.speed = Some(clamp_speed(speed));
        touched |= ViewMask::SPEED;
    }
    if let (Some(presets), true) = (&settings.speed_presets, mask.contains(ViewMask::PRESETS)) {
        view.speed_presets = Some(presets.iter().copied().map(clamp_speed).collect());
        touched |= ViewMask::PRESETS;
    }
    if let (Some(fx), true) = (&settings.fx, mask.contains(ViewMask::FX)) {
        view.fx = Some(fx.clone());
        touched |= ViewMask::FX;
    }

    if !patch.rules.is_empty() && mask.contains(ViewMask::RULES) {
        if let Some(rules) = view.rules.take() {
            let mut list = RuleList::from(rules);
            for edit in &patch.rules {
                edit.apply_to(&mut list);
            }
            view.rules = Some(list.to_vec());
            touched |= ViewMask::RULES;
        }
    }

    if let (Some(own_tab), true) = (key.tab, mask.contains(ViewMask::TAB)) {
        for edit in patch.tabs.iter().filter(|edit| edit.tab() == own_tab) {
            let next = match edit {
                TabEdit::SetOverride { manual, .. } => view
                    .tab
                    .as_ref()
                    .and_then(|state| state.with_manual(manual.clone().sanitized())),
                TabEdit::ClearOverride { .. } => view
                    .tab
                    .as_ref()
                    .and_then(|state| state.with_manual(ManualOverride::default())),
                TabEdit::Close { .. } => {
                    view.tab = None;
                    touched |= ViewMask::TAB;
                    continue;
                }
                TabEdit::Navigate { .. } => continue,
            };
            if let Some(next) = next {
                view.tab = Some(next);
                touched |= ViewMask::TAB;
            }
        }
    }

    touched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::SettingsPatch;
    use crate::patch::RuleEdit;
    use crate::rule::RuleId;

    fn delta(revision: u64, view: View, fields: ViewMask, confirms: Option<u64>) -> Delta {
        Delta {
            revision,
            fields,
            view,
            confirms,
        }
    }

    fn speed_view(speed: f64) -> View {
        View {
            speed: Some(speed),
            ..Default::default()
        }
    }

    fn speed_patch(speed: f64) -> Patch {
        Patch::settings(SettingsPatch {
            speed: Some(speed),
            ..Default::default()
        })
    }

    fn speed_projection() -> Projection {
        let mut p = Projection::new(ViewKey::global(ViewMask::SPEED));
        p.apply_snapshot(&delta(1, speed_view(1.0), ViewMask::SPEED, None));
        p
    }

    #[test]
    fn test_project_only_requested_fields() {
        let doc = Document::default();
        let view = View::project(&doc, ViewMask::ENABLED | ViewMask::SPEED, None);
        assert_eq!(view.enabled, Some(true));
        assert_eq!(view.speed, Some(1.0));
        assert!(view.rules.is_none());
        assert!(view.fx.is_none());
    }

    #[test]
    fn test_optimistic_write_then_confirm() {
        let mut p = speed_projection();
        assert_eq!(p.apply_local(&speed_patch(2.0), 1), ViewMask::SPEED);
        assert_eq!(p.current().speed, Some(2.0));
        assert_eq!(p.confirmed().speed, Some(1.0));

        let r = p.reconcile(&delta(2, speed_view(2.0), ViewMask::SPEED, Some(1)));
        assert!(r.changed.is_empty());
        assert!(r.snapped_back.is_empty());
        assert!(p.pending_fields().is_empty());
        assert_eq!(p.current().speed, Some(2.0));
    }

    #[test]
    fn test_lost_race_snaps_back() {
        let mut p = speed_projection();
        p.apply_local(&speed_patch(2.0), 1);
        // our write applied at revision 2, then another writer set 3.0 at revision 3
        p.reconcile(&delta(2, speed_view(2.0), ViewMask::SPEED, Some(1)));
        let r = p.reconcile(&delta(3, speed_view(3.0), ViewMask::SPEED, None));
        assert_eq!(r.changed, ViewMask::SPEED);
        assert_eq!(p.current().speed, Some(3.0));
    }

    #[test]
    fn test_authority_value_wins_on_confirm() {
        let mut p = speed_projection();
        p.apply_local(&speed_patch(2.0), 1);
        // foreign write lands first; still masked by our pending value
        let r = p.reconcile(&delta(2, speed_view(5.0), ViewMask::SPEED, None));
        assert!(r.changed.is_empty());
        assert_eq!(p.current().speed, Some(2.0));
        // the authority confirms with a different value than we wrote
        let r = p.reconcile(&delta(3, speed_view(4.0), ViewMask::SPEED, Some(1)));
        assert_eq!(r.snapped_back, ViewMask::SPEED);
        assert_eq!(p.current().speed, Some(4.0));
    }

    #[test]
    fn test_confirm_of_older_write_keeps_newer_pending() {
        let mut p = speed_projection();
        p.apply_local(&speed_patch(2.0), 1);
        p.apply_local(&speed_patch(3.0), 2);
        p.reconcile(&delta(2, speed_view(2.0), ViewMask::SPEED, Some(1)));
        assert_eq!(p.current().speed, Some(3.0));
        assert_eq!(p.pending_fields(), ViewMask::SPEED);
        p.reconcile(&delta(3, speed_view(3.0), ViewMask::SPEED, Some(2)));
        assert!(p.pending_fields().is_empty());
    }

    #[test]
    fn test_stale_delta_is_ignored() {
        let mut p = speed_projection();
        p.reconcile(&delta(5, speed_view(2.0), ViewMask::SPEED, None));
        let r = p.reconcile(&delta(4, speed_view(9.0), ViewMask::SPEED, None));
        assert!(r.stale);
        assert_eq!(p.current().speed, Some(2.0));
        assert_eq!(p.revision(), Some(5));
    }

    #[test]
    fn test_fields_outside_mask_are_dropped() {
        let mut p = speed_projection();
        let view = View {
            speed: Some(2.0),
            enabled: Some(false),
            ..Default::default()
        };
        p.reconcile(&delta(2, view, ViewMask::SPEED | ViewMask::ENABLED, None));
        assert!(p.current().enabled.is_none());
        let enable = Patch::settings(SettingsPatch {
            enabled: Some(true),
            ..Default::default()
        });
        assert_eq!(p.apply_local(&enable, 1), ViewMask::empty());
        assert_eq!(p.unconfirmed(), 0);
    }

    #[test]
    fn test_writes_before_snapshot_survive_snapshot() {
        let mut p = Projection::new(ViewKey::global(ViewMask::SPEED));
        p.apply_local(&speed_patch(2.0), 1);
        p.apply_snapshot(&delta(7, speed_view(1.0), ViewMask::SPEED, None));
        assert_eq!(p.current().speed, Some(2.0));
        assert_eq!(p.revision(), Some(7));
    }

    #[test]
    fn test_local_rule_edits() {
        let key = ViewKey::global(ViewMask::RULES);
        let mut p = Projection::new(key);
        let rules = vec![
            RuleModel::with_id(RuleId::from("a")),
            RuleModel::with_id(RuleId::from("b")),
        ];
        p.apply_snapshot(&delta(
            1,
            View {
                rules: Some(rules),
                ..Default::default()
            },
            ViewMask::RULES,
            None,
        ));
        let patch = Patch::rule(RuleEdit::Move {
            id: RuleId::from("a"),
            down: true,
        });
        assert_eq!(p.apply_local(&patch, 1), ViewMask::RULES);
        let ids: Vec<String> = p
            .current()
            .rules
            .unwrap_or_default()
            .into_iter()
            .map(|r| r.id.0)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_local_manual_override_on_own_tab() {
        let key = ViewKey::for_tab(ViewMask::TAB, 3);
        let mut p = Projection::new(key);
        let tab = TabState::observed("https://a.com/", true);
        p.apply_snapshot(&delta(
            1,
            View {
                tab: Some(tab),
                ..Default::default()
            },
            ViewMask::TAB,
            None,
        ));
        let manual = ManualOverride {
            speed: Some(2.0),
            ..Default::default()
        };
        let other_tab = Patch::tab(TabEdit::SetOverride {
            tab: 4,
            manual: manual.clone(),
        });
        assert!(p.apply_local(&other_tab, 1).is_empty());
        let own_tab = Patch::tab(TabEdit::SetOverride { tab: 3, manual });
        assert_eq!(p.apply_local(&own_tab, 2), ViewMask::TAB);
        assert_eq!(p.current().tab.map(|t| t.speed), Some(2.0));
    }

    fn rule_ids(view: &View) -> Vec<String> {
        view.rules
            .iter()
            .flatten()
            .map(|rule| rule.id.0.clone())
            .collect()
    }

    fn rules_view(ids: &[&str]) -> View {
        View {
            rules: Some(ids.iter().map(|id| RuleModel::with_id(RuleId::from(*id))).collect()),
            ..Default::default()
        }
    }

    fn tab_view(tab: TabState) -> View {
        View {
            tab: Some(tab),
            ..Default::default()
        }
    }

    #[test]
    fn test_rule_write_before_snapshot_lands_on_snapshot() {
        let mut p = Projection::new(ViewKey::global(ViewMask::RULES));
        let upsert = Patch::rule(RuleEdit::Upsert {
            rule: RuleModel::with_id(RuleId::from("c")),
        });
        // rules unknown yet: nothing to show, but the write is kept
        assert!(p.apply_local(&upsert, 1).is_empty());
        assert_eq!(p.unconfirmed(), 1);

        let changed = p.apply_snapshot(&delta(4, rules_view(&["a", "b"]), ViewMask::RULES, None));
        assert_eq!(changed, ViewMask::RULES);
        assert_eq!(rule_ids(&p.current()), vec!["a", "b", "c"]);
        assert_eq!(p.pending_fields(), ViewMask::RULES);

        let r = p.reconcile(&delta(5, rules_view(&["a", "b", "c"]), ViewMask::RULES, Some(1)));
        assert!(r.snapped_back.is_empty());
        assert!(r.changed.is_empty());
        assert!(p.pending_fields().is_empty());
    }

    #[test]
    fn test_confirmed_move_is_not_applied_twice() {
        let mut p = Projection::new(ViewKey::global(ViewMask::RULES));
        p.apply_snapshot(&delta(1, rules_view(&["a", "b", "c"]), ViewMask::RULES, None));
        let down = Patch::rule(RuleEdit::Move {
            id: RuleId::from("a"),
            down: true,
        });
        p.apply_local(&down, 1);
        assert_eq!(rule_ids(&p.current()), vec!["b", "a", "c"]);

        let r = p.reconcile(&delta(2, rules_view(&["b", "a", "c"]), ViewMask::RULES, Some(1)));
        assert!(r.snapped_back.is_empty());
        assert_eq!(rule_ids(&p.current()), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_foreign_rule_edit_under_pending_write() {
        let mut p = Projection::new(ViewKey::global(ViewMask::RULES));
        p.apply_snapshot(&delta(1, rules_view(&["a"]), ViewMask::RULES, None));
        p.apply_local(
            &Patch::rule(RuleEdit::Upsert {
                rule: RuleModel::with_id(RuleId::from("mine")),
            }),
            1,
        );
        p.reconcile(&delta(2, rules_view(&["a", "theirs"]), ViewMask::RULES, None));
        assert_eq!(rule_ids(&p.current()), vec!["a", "theirs", "mine"]);
    }

    #[test]
    fn test_tab_override_before_snapshot_lands_on_snapshot() {
        let key = ViewKey::for_tab(ViewMask::TAB, 3);
        let mut p = Projection::new(key);
        let manual = ManualOverride {
            speed: Some(2.0),
            ..Default::default()
        };
        p.apply_local(&Patch::tab(TabEdit::SetOverride { tab: 3, manual }), 1);
        assert!(p.current().tab.is_none());

        let tab = TabState::observed("https://a.com/", true);
        p.apply_snapshot(&delta(1, tab_view(tab), ViewMask::TAB, None));
        let visible = p.current().tab.unwrap();
        assert_eq!(visible.url, "https://a.com/");
        assert_eq!(visible.speed, 2.0);
        assert_eq!(visible.provenance.speed, crate::document::Source::Manual);
    }

    #[test]
    fn test_uncontested_clear_override_does_not_snap_back() {
        let key = ViewKey::for_tab(ViewMask::TAB, 3);
        let mut p = Projection::new(key);
        let mut tab = TabState::observed("https://a.com/", true);
        tab.manual.speed = Some(2.0);
        tab.speed = 2.0;
        tab.provenance.speed = crate::document::Source::Manual;
        p.apply_snapshot(&delta(1, tab_view(tab), ViewMask::TAB, None));

        // the value under the override is not known locally
        assert!(p
            .apply_local(&Patch::tab(TabEdit::ClearOverride { tab: 3 }), 1)
            .is_empty());
        assert!(p.pending_fields().is_empty());
        assert_eq!(p.unconfirmed(), 1);

        let cleared = TabState::observed("https://a.com/", true);
        let r = p.reconcile(&delta(2, tab_view(cleared), ViewMask::TAB, Some(1)));
        assert_eq!(r.changed, ViewMask::TAB);
        assert!(r.snapped_back.is_empty());
        assert_eq!(p.current().tab.map(|t| t.speed), Some(1.0));
        assert_eq!(p.unconfirmed(), 0);
    }

    #[test]
    fn test_override_that_drops_a_field_waits_for_authority() {
        let key = ViewKey::for_tab(ViewMask::TAB, 3);
        let mut p = Projection::new(key);
        let tab = TabState::observed("https://a.com/", true);
        p.apply_snapshot(&delta(1, tab_view(tab), ViewMask::TAB, None));
        let speed_only = ManualOverride {
            speed: Some(2.0),
            ..Default::default()
        };
        let enabled_only = ManualOverride {
            enabled: Some(false),
            ..Default::default()
        };
        p.apply_local(&Patch::tab(TabEdit::SetOverride { tab: 3, manual: speed_only }), 1);
        p.apply_local(&Patch::tab(TabEdit::SetOverride { tab: 3, manual: enabled_only }), 2);
        // second write drops the manual speed; only the first shows
        let visible = p.current().tab.unwrap();
        assert_eq!(visible.speed, 2.0);
        assert!(visible.enabled);
    }
}
