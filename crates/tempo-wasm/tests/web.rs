#![cfg(target_arch = "wasm32")]

use tempo_wasm::{
    check_rules, new_rule, resolve_rules, swap_fx, with_match_type, Background, ViewProjection,
};
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

#[wasm_bindgen_test]
fn test_new_rule_resolves_on_twitch() {
    let rule = new_rule().unwrap();
    let rules = format!("[{}]", rule);
    let resolved = resolve_rules(&rules, "https://www.twitch.tv/videos/1", true).unwrap();
    assert!(resolved.contains("\"speed\":{"));
}

#[wasm_bindgen_test]
fn test_check_rules_returns_array() {
    let rule = with_match_type(&new_rule().unwrap(), "REGEX").unwrap();
    let broken = rule.replace(r#""match":"twitch\\.tv""#, r#""match":"(""#);
    let problems = check_rules(&format!("[{}]", broken)).unwrap();
    assert_eq!(js_sys::Array::from(&problems).length(), 1);
}

#[wasm_bindgen_test]
fn test_swap_fx_rejects_garbage() {
    assert!(swap_fx("nope").is_err());
}

#[wasm_bindgen_test]
fn test_background_over_js_callbacks() {
    let load = js_sys::Function::new_with_args("key", "return null;");
    let store = js_sys::Function::new_with_args("key, json", "globalThis.__tempo = json;");
    let mut bg = Background::new(load, store, None).unwrap();
    bg.patch(r#"{"settings": {"speed": 3}}"#, None).unwrap();
    assert!(!bg.is_dirty());
    let stored = js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("__tempo")).unwrap();
    assert!(stored.as_string().unwrap().contains("\"speed\":3.0"));
}

#[wasm_bindgen_test]
fn test_throwing_store_callback_marks_dirty() {
    let load = js_sys::Function::new_with_args("key", "return null;");
    let store = js_sys::Function::new_with_args("key, json", "throw new Error('quota');");
    let mut bg = Background::new(load, store, None).unwrap();
    let outcome = bg.patch(r#"{"settings": {"enabled": false}}"#, None).unwrap();
    assert!(outcome.contains("\"persisted\":false"));
    assert!(bg.is_dirty());
}

#[wasm_bindgen_test]
fn test_projection_shows_local_write_over_snapshot() {
    let mut view = ViewProjection::new(r#"{"mask": "SPEED", "tab": null}"#, None).unwrap();
    view.write(r#"{"settings": {"speed": 2}}"#).unwrap();
    view.apply_snapshot(r#"{"revision": 3, "fields": "SPEED", "view": {"speed": 1.0}}"#)
        .unwrap();
    assert!(view.current().unwrap().contains("\"speed\":2.0"));
    assert_eq!(view.revision(), Some(3.0));
    assert_eq!(view.unconfirmed(), 1);
}
