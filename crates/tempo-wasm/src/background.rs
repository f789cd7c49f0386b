//! The background page's state store, driven from JS
//!
//! The host routes messages from other extension contexts into [`Background`]
//! and, after each call, drains `takeNotifications()` to forward deltas to
//! the ports of the subscriptions they are addressed to.

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::Function;
use serde::Serialize;
use wasm_bindgen::prelude::*;

use tempo_core::patch::Patch;
use tempo_core::storage::{MemoryStorage, Storage, StorageError};
use tempo_core::store::{NotificationSink, SinkClosed, StateStore, StoreConfig, StoreError};
use tempo_core::types::{Origin, SubscriptionId, ViewKey, ViewMask};
use tempo_core::view::Delta;

use crate::api::{parse, to_json};

// =============================================================================
// Storage
// =============================================================================

/// Storage backed by two synchronous host callbacks:
/// `load(key) -> string | null` and `store(key, json)`.
pub struct JsStorage {
    load: Function,
    store: Function,
}

impl JsStorage {
    pub fn new(load: Function, store: Function) -> Self {
        Self { load, store }
    }
}

fn js_storage_error(e: JsValue) -> StorageError {
    StorageError::Unavailable(e.as_string().unwrap_or_else(|| format!("{:?}", e)))
}

impl Storage for JsStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let value = self
            .load
            .call1(&JsValue::NULL, &JsValue::from_str(key))
            .map_err(js_storage_error)?;
        if value.is_null() || value.is_undefined() {
            return Ok(None);
        }
        value
            .as_string()
            .map(|text| Some(text.into_bytes()))
            .ok_or_else(|| {
                StorageError::Unavailable("load callback must return a string".to_string())
            })
    }

    fn store(&mut self, key: &str, blob: &[u8]) -> Result<(), StorageError> {
        let text = String::from_utf8_lossy(blob);
        self.store
            .call2(&JsValue::NULL, &JsValue::from_str(key), &JsValue::from_str(&text))
            .map_err(js_storage_error)?;
        Ok(())
    }
}

pub enum HostStorage {
    Js(JsStorage),
    Memory(MemoryStorage),
}

impl Storage for HostStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match self {
            HostStorage::Js(storage) => storage.load(key),
            HostStorage::Memory(storage) => storage.load(key),
        }
    }

    fn store(&mut self, key: &str, blob: &[u8]) -> Result<(), StorageError> {
        match self {
            HostStorage::Js(storage) => storage.store(key, blob),
            HostStorage::Memory(storage) => storage.store(key, blob),
        }
    }
}

// =============================================================================
// Outbox
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub subscription: SubscriptionId,
    pub delta: Delta,
}

/// Collects deltas until the host drains them. Never reports closed:
/// the host tells us about disconnected ports through `unsubscribe`.
pub struct OutboxSink(Rc<RefCell<Vec<Notification>>>);

impl NotificationSink for OutboxSink {
    fn deliver(&mut self, subscription: SubscriptionId, delta: Delta) -> Result<(), SinkClosed> {
        self.0.borrow_mut().push(Notification { subscription, delta });
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchOutcome {
    pub revision: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<ViewMask>,
    pub persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Subscribed {
    subscription: SubscriptionId,
    snapshot: Delta,
}

// =============================================================================
// Background
// =============================================================================

#[wasm_bindgen]
pub struct Background {
    store: StateStore<HostStorage, OutboxSink>,
    outbox: Rc<RefCell<Vec<Notification>>>,
}

impl Background {
    pub fn with_storage(storage: HostStorage, config: StoreConfig) -> Result<Self, String> {
        let store = StateStore::open(storage, config)
            .map_err(|e| format!("Failed to open store: {}", e))?;
        log::info!("background store ready, {} rules", store.document().rules.len());
        Ok(Self {
            store,
            outbox: Rc::new(RefCell::new(Vec::new())),
        })
    }

    pub fn read_json(&self, key_json: &str) -> Result<String, String> {
        let key: ViewKey = parse(key_json, "view key")?;
        to_json(&self.store.read(&key))
    }

    /// Applies a patch. A persistence failure is reported in the outcome,
    /// not as an error: the change is live either way.
    pub fn patch_json(
        &mut self,
        patch_json: &str,
        origin_json: Option<&str>,
    ) -> Result<String, String> {
        let patch: Patch = parse(patch_json, "patch")?;
        let origin: Option<Origin> = origin_json.map(|json| parse(json, "origin")).transpose()?;
        let outcome = match self.store.patch(patch, origin) {
            Ok(ack) => PatchOutcome {
                revision: ack.revision,
                changed: Some(ack.changed),
                persisted: true,
                error: None,
            },
            Err(StoreError::Persist { revision, source }) => PatchOutcome {
                revision,
                changed: None,
                persisted: false,
                error: Some(source.to_string()),
            },
            Err(e) => return Err(e.to_string()),
        };
        to_json(&outcome)
    }

    pub fn subscribe_json(&mut self, key_json: &str) -> Result<String, String> {
        let key: ViewKey = parse(key_json, "view key")?;
        let sink = OutboxSink(Rc::clone(&self.outbox));
        let (subscription, snapshot) = self.store.subscribe(key, sink);
        to_json(&Subscribed {
            subscription,
            snapshot,
        })
    }

    pub fn take_notifications_json(&mut self) -> Result<String, String> {
        let drained: Vec<Notification> = self.outbox.borrow_mut().drain(..).collect();
        to_json(&drained)
    }

    pub fn store(&self) -> &StateStore<HostStorage, OutboxSink> {
        &self.store
    }
}

#[wasm_bindgen]
impl Background {
    /// Opens the store over host storage callbacks. `config_json` is an
    /// optional `StoreConfig`.
    #[wasm_bindgen(constructor)]
    pub fn new(
        load: Function,
        store: Function,
        config_json: Option<String>,
    ) -> Result<Background, JsValue> {
        let config = parse_config(config_json.as_deref()).map_err(|e| JsValue::from_str(&e))?;
        Self::with_storage(HostStorage::Js(JsStorage::new(load, store)), config)
            .map_err(|e| JsValue::from_str(&e))
    }

    /// A store that keeps everything in memory.
    #[wasm_bindgen(js_name = inMemory)]
    pub fn in_memory(config_json: Option<String>) -> Result<Background, JsValue> {
        let config = parse_config(config_json.as_deref()).map_err(|e| JsValue::from_str(&e))?;
        Self::with_storage(HostStorage::Memory(MemoryStorage::new()), config)
            .map_err(|e| JsValue::from_str(&e))
    }

    pub fn read(&self, key_json: &str) -> Result<String, JsValue> {
        self.read_json(key_json).map_err(|e| JsValue::from_str(&e))
    }

    pub fn patch(
        &mut self,
        patch_json: &str,
        origin_json: Option<String>,
    ) -> Result<String, JsValue> {
        self.patch_json(patch_json, origin_json.as_deref())
            .map_err(|e| JsValue::from_str(&e))
    }

    pub fn subscribe(&mut self, key_json: &str) -> Result<String, JsValue> {
        self.subscribe_json(key_json).map_err(|e| JsValue::from_str(&e))
    }

    pub fn unsubscribe(&mut self, subscription: u32) -> bool {
        self.store.unsubscribe(SubscriptionId(subscription as u64))
    }

    #[wasm_bindgen(js_name = takeNotifications)]
    pub fn take_notifications(&mut self) -> Result<String, JsValue> {
        self.take_notifications_json().map_err(|e| JsValue::from_str(&e))
    }

    pub fn flush(&mut self) -> Result<(), JsValue> {
        self.store
            .flush()
            .map_err(|e| JsValue::from_str(&format!("Flush failed: {}", e)))
    }

    #[wasm_bindgen(js_name = isDirty)]
    pub fn is_dirty(&self) -> bool {
        self.store.is_dirty()
    }

    pub fn revision(&self) -> f64 {
        self.store.revision() as f64
    }
}

fn parse_config(config_json: Option<&str>) -> Result<StoreConfig, String> {
    match config_json {
        Some(json) => parse(json, "store config"),
        None => Ok(StoreConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn background() -> Background {
        let storage = HostStorage::Memory(MemoryStorage::new());
        Background::with_storage(storage, StoreConfig::default()).unwrap()
    }

    #[test]
    fn test_subscribe_patch_and_drain() {
        let mut bg = background();
        let subscribed = bg.subscribe_json(r#"{"mask": "SPEED", "tab": null}"#).unwrap();
        let subscribed: Value = serde_json::from_str(&subscribed).unwrap();
        assert_eq!(subscribed["subscription"], 1);
        assert_eq!(subscribed["snapshot"]["view"]["speed"], 1.0);

        let outcome: Value = serde_json::from_str(
            &bg.patch_json(
                r#"{"settings": {"speed": 2.5}}"#,
                Some(r#"{"subscription": 1, "seq": 1}"#),
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(outcome["revision"], 1);
        assert_eq!(outcome["persisted"], true);

        let notes: Value = serde_json::from_str(&bg.take_notifications_json().unwrap()).unwrap();
        assert_eq!(notes[0]["subscription"], 1);
        assert_eq!(notes[0]["delta"]["view"]["speed"], 2.5);
        assert_eq!(notes[0]["delta"]["confirms"], 1);
        assert_eq!(bg.take_notifications_json().unwrap(), "[]");
    }

    #[test]
    fn test_persist_failure_is_an_outcome() {
        let mut storage = MemoryStorage::new();
        storage.fail_next_writes(3);
        let mut bg =
            Background::with_storage(HostStorage::Memory(storage), StoreConfig::default()).unwrap();
        let outcome = bg.patch_json(r#"{"settings": {"enabled": false}}"#, None).unwrap();
        let outcome: Value = serde_json::from_str(&outcome).unwrap();
        assert_eq!(outcome["persisted"], false);
        assert!(bg.is_dirty());
        let read = bg.read_json(r#"{"mask": "ENABLED"}"#).unwrap();
        let read: Value = serde_json::from_str(&read).unwrap();
        assert_eq!(read["view"]["enabled"], false);
    }

    #[test]
    fn test_bad_input_is_reported() {
        let mut bg = background();
        assert!(bg.patch_json("{", None).unwrap_err().starts_with("Invalid patch"));
        assert!(bg.subscribe_json("[]").unwrap_err().starts_with("Invalid view key"));
        assert_eq!(bg.store().subscriber_count(), 0);
    }
}
