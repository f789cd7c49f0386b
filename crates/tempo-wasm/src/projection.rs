//! Optimistic views for JS contexts
//!
//! Popups, options pages and content scripts hold a [`ViewProjection`] per
//! subscription. Local writes go through `write()`, which returns the
//! sequence number to send as the patch origin; snapshots and deltas the
//! background forwards go through `applySnapshot()` and `reconcile()`.

use serde::Serialize;
use wasm_bindgen::prelude::*;

use tempo_core::patch::Patch;
use tempo_core::types::{ViewKey, ViewMask};
use tempo_core::view::{Delta, Projection, Reconciled, View};

use crate::api::{parse, to_json};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Written {
    seq: u64,
    changed: ViewMask,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Folded {
    changed: ViewMask,
    snapped_back: ViewMask,
    stale: bool,
}

impl From<Reconciled> for Folded {
    fn from(r: Reconciled) -> Self {
        Self {
            changed: r.changed,
            snapped_back: r.snapped_back,
            stale: r.stale,
        }
    }
}

#[wasm_bindgen(js_name = Projection)]
pub struct ViewProjection {
    inner: Projection,
    next_seq: u64,
}

impl ViewProjection {
    pub fn from_json(key_json: &str, last_known_json: Option<&str>) -> Result<Self, String> {
        let key: ViewKey = parse(key_json, "view key")?;
        let last_known: View = match last_known_json {
            Some(json) => parse(json, "view")?,
            None => View::default(),
        };
        Ok(Self {
            inner: Projection::with_fallback(key, last_known),
            next_seq: 1,
        })
    }

    pub fn write_json(&mut self, patch_json: &str) -> Result<String, String> {
        let patch: Patch = parse(patch_json, "patch")?;
        let seq = self.next_seq;
        self.next_seq += 1;
        let changed = self.inner.apply_local(&patch, seq);
        to_json(&Written { seq, changed })
    }

    pub fn apply_snapshot_json(&mut self, delta_json: &str) -> Result<String, String> {
        let delta: Delta = parse(delta_json, "snapshot")?;
        to_json(&self.inner.apply_snapshot(&delta))
    }

    pub fn reconcile_json(&mut self, delta_json: &str) -> Result<String, String> {
        let delta: Delta = parse(delta_json, "delta")?;
        to_json(&Folded::from(self.inner.reconcile(&delta)))
    }

    pub fn projection(&self) -> &Projection {
        &self.inner
    }
}

#[wasm_bindgen(js_class = Projection)]
impl ViewProjection {
    /// `key_json` is a `ViewKey`; `last_known_json` an optional `View` shown
    /// until the snapshot arrives.
    #[wasm_bindgen(constructor)]
    pub fn new(key_json: &str, last_known_json: Option<String>) -> Result<ViewProjection, JsValue> {
        Self::from_json(key_json, last_known_json.as_deref()).map_err(|e| JsValue::from_str(&e))
    }

    /// Applies a patch locally. Returns `{seq, changed}`; send `seq` with
    /// the patch so the background can confirm it.
    pub fn write(&mut self, patch_json: &str) -> Result<String, JsValue> {
        self.write_json(patch_json).map_err(|e| JsValue::from_str(&e))
    }

    #[wasm_bindgen(js_name = applySnapshot)]
    pub fn apply_snapshot(&mut self, delta_json: &str) -> Result<String, JsValue> {
        self.apply_snapshot_json(delta_json)
            .map_err(|e| JsValue::from_str(&e))
    }

    pub fn reconcile(&mut self, delta_json: &str) -> Result<String, JsValue> {
        self.reconcile_json(delta_json)
            .map_err(|e| JsValue::from_str(&e))
    }

    pub fn current(&self) -> Result<String, JsValue> {
        to_json(&self.inner.current()).map_err(|e| JsValue::from_str(&e))
    }

    pub fn confirmed(&self) -> Result<String, JsValue> {
        to_json(self.inner.confirmed()).map_err(|e| JsValue::from_str(&e))
    }

    #[wasm_bindgen(js_name = pendingFields)]
    pub fn pending_fields(&self) -> Result<String, JsValue> {
        to_json(&self.inner.pending_fields()).map_err(|e| JsValue::from_str(&e))
    }

    pub fn unconfirmed(&self) -> u32 {
        self.inner.unconfirmed() as u32
    }

    /// `undefined` before the first snapshot.
    pub fn revision(&self) -> Option<f64> {
        self.inner.revision().map(|revision| revision as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::{Background, HostStorage};
    use serde_json::Value;
    use tempo_core::storage::MemoryStorage;
    use tempo_core::store::StoreConfig;

    const RULE_C: &str = r#"{"rules": [{"op": "upsert", "rule": {"id": "c", "enabled": true,
        "initialLoadOnly": false, "strict": false, "matchType": "CONTAINS",
        "match": "c.com", "override": {"type": "SPEED", "value": 2.0}}}]}"#;

    fn background() -> Background {
        let storage = HostStorage::Memory(MemoryStorage::new());
        Background::with_storage(storage, StoreConfig::default()).unwrap()
    }

    fn json(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    fn rule_ids(view: &Value) -> Vec<String> {
        view["rules"]
            .as_array()
            .map(|rules| {
                rules
                    .iter()
                    .filter_map(|rule| rule["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_write_before_snapshot_confirmed_through_background() {
        let mut bg = background();
        let key = r#"{"mask": "RULES", "tab": null}"#;
        let mut view = ViewProjection::from_json(key, None).unwrap();

        let written = json(&view.write_json(RULE_C).unwrap());
        assert_eq!(written["seq"], 1);
        assert_eq!(view.projection().unconfirmed(), 1);

        let subscribed = json(&bg.subscribe_json(key).unwrap());
        view.apply_snapshot_json(&subscribed["snapshot"].to_string())
            .unwrap();
        let visible = to_json(&view.projection().current()).unwrap();
        assert_eq!(rule_ids(&json(&visible)), vec!["c"]);

        let origin = format!(r#"{{"subscription": {}, "seq": 1}}"#, subscribed["subscription"]);
        bg.patch_json(RULE_C, Some(&origin)).unwrap();
        let notes = json(&bg.take_notifications_json().unwrap());
        let folded = json(&view.reconcile_json(&notes[0]["delta"].to_string()).unwrap());
        assert_eq!(folded["stale"], false);
        assert!(view.projection().pending_fields().is_empty());
        assert_eq!(view.projection().unconfirmed(), 0);
        assert_eq!(folded["snappedBack"], json(&to_json(&ViewMask::empty()).unwrap()));
    }

    #[test]
    fn test_last_known_view_until_snapshot() {
        let key = r#"{"mask": "SPEED", "tab": null}"#;
        let view = ViewProjection::from_json(key, Some(r#"{"speed": 1.5}"#)).unwrap();
        assert_eq!(view.projection().current().speed, Some(1.5));
        assert_eq!(view.projection().revision(), None);
    }

    #[test]
    fn test_bad_input_is_reported() {
        assert!(ViewProjection::from_json("{", None).is_err());
        let mut view = ViewProjection::from_json(r#"{"mask": "SPEED"}"#, None).unwrap();
        assert!(view.write_json("nope").is_err());
        assert!(view.reconcile_json("{}").is_err());
    }
}
