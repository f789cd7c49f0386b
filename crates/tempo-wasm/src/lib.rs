//! WebAssembly bindings for Tempo
//!
//! Values cross the boundary as JSON strings in the shapes the TypeScript
//! bindings describe.

use log::LevelFilter;
use wasm_bindgen::prelude::*;

pub mod api;
pub mod background;
mod console;
pub mod projection;

pub use background::Background;
pub use projection::ViewProjection;

fn js_err(message: String) -> JsValue {
    JsValue::from_str(&message)
}

/// Routes `log` output to the browser console at `level`
/// (`error`, `warn`, `info`, `debug`, `trace`).
#[wasm_bindgen(js_name = initLogging)]
pub fn init_logging(level: &str) {
    console::init(console::parse_level(level));
}

#[wasm_bindgen(js_name = disableLogging)]
pub fn disable_logging() {
    log::set_max_level(LevelFilter::Off);
}

#[wasm_bindgen(js_name = resolveRules)]
pub fn resolve_rules(
    rules_json: &str,
    url: &str,
    is_initial_load: bool,
) -> Result<String, JsValue> {
    api::resolve_rules(rules_json, url, is_initial_load).map_err(js_err)
}

#[wasm_bindgen(js_name = resolveTab)]
pub fn resolve_tab(
    rules_json: &str,
    load_url: Option<String>,
    url: &str,
    in_page: bool,
) -> Result<String, JsValue> {
    api::resolve_tab(rules_json, load_url.as_deref(), url, in_page).map_err(js_err)
}

#[wasm_bindgen(js_name = newRule)]
pub fn new_rule() -> Result<String, JsValue> {
    api::new_rule().map_err(js_err)
}

#[wasm_bindgen(js_name = withMatchType)]
pub fn with_match_type(rule_json: &str, match_type: &str) -> Result<String, JsValue> {
    api::with_match_type(rule_json, match_type).map_err(js_err)
}

#[wasm_bindgen(js_name = withTarget)]
pub fn with_target(rule_json: &str, target: &str) -> Result<String, JsValue> {
    api::with_target(rule_json, target).map_err(js_err)
}

/// Problems found in a rule list, one message per problem.
#[wasm_bindgen(js_name = checkRules)]
pub fn check_rules(rules_json: &str) -> Result<JsValue, JsValue> {
    let problems = api::check_rules(rules_json).map_err(js_err)?;
    let result = js_sys::Array::new_with_length(problems.len() as u32);
    for (i, problem) in problems.iter().enumerate() {
        result.set(i as u32, JsValue::from_str(problem));
    }
    Ok(result.into())
}

#[wasm_bindgen(js_name = swapFx)]
pub fn swap_fx(pair_json: &str) -> Result<String, JsValue> {
    api::swap_fx(pair_json).map_err(js_err)
}
