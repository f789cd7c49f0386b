use std::fs;

use serde::Deserialize;

use tempo_core::engine::{check_rules, Resolved, ResolvedOverrides, Resolver};
use tempo_core::fx::FxPair;
use tempo_core::rule::RuleModel;

/// A rule file is either a bare JSON array of rules or a stored document
/// with a `rules` field.
#[derive(Deserialize)]
#[serde(untagged)]
enum RulesFile {
    List(Vec<RuleModel>),
    Document { rules: Vec<RuleModel> },
}

pub fn parse_rules(text: &str) -> Result<Vec<RuleModel>, String> {
    match serde_json::from_str::<RulesFile>(text) {
        Ok(RulesFile::List(rules)) | Ok(RulesFile::Document { rules }) => Ok(rules),
        Err(e) => Err(format!("Invalid rule file: {}", e)),
    }
}

pub fn load_rules(path: &str) -> Result<Vec<RuleModel>, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    parse_rules(&text).map_err(|e| format!("{} ('{}')", e, path))
}

pub struct ResolveOptions {
    pub rules_path: String,
    pub url: String,
    pub load_url: Option<String>,
    pub in_page: bool,
    pub json: bool,
}

pub fn resolve_url(
    rules: &[RuleModel],
    url: &str,
    load_url: Option<&str>,
    in_page: bool,
) -> ResolvedOverrides {
    let resolver = Resolver::new(rules);
    if in_page {
        resolver.resolve_tab(load_url, url, true)
    } else {
        resolver.resolve(url, true)
    }
}

pub fn cmd_resolve(opts: ResolveOptions) -> Result<(), String> {
    let rules = load_rules(&opts.rules_path)?;
    let resolved = resolve_url(&rules, &opts.url, opts.load_url.as_deref(), opts.in_page);
    log::info!("resolved '{}' against {} rules", opts.url, rules.len());

    if opts.json {
        let out = serde_json::to_string_pretty(&resolved)
            .map_err(|e| format!("Failed to encode result: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    println!("URL: {}", opts.url);
    if let Some(load_url) = &opts.load_url {
        println!("  Loaded from: {}", load_url);
    }
    println!("  STATE:  {}", describe(&resolved.state, |v| on_off(*v).to_string()));
    println!("  SPEED:  {}", describe(&resolved.speed, |v| format!("{}x", v)));
    println!("  FX:     {}", describe(&resolved.fx, |v| fx_label(v).to_string()));
    Ok(())
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn fx_label(fx: &FxPair) -> &'static str {
    if fx.is_active() {
        "active"
    } else {
        "neutral"
    }
}

fn describe<T>(resolved: &Option<Resolved<T>>, show: impl Fn(&T) -> String) -> String {
    match resolved {
        Some(r) => format!("{} (rule {})", show(&r.value), r.rule),
        None => "-".to_string(),
    }
}

pub fn cmd_check(rules_path: &str) -> Result<(), String> {
    let rules = load_rules(rules_path)?;
    let problems = check_rules(&rules);
    let enabled = rules.iter().filter(|r| r.enabled).count();

    println!("Rule file '{}'", rules_path);
    println!("  Rules:    {} ({} enabled)", rules.len(), enabled);
    if problems.is_empty() {
        println!("  No problems found");
        return Ok(());
    }
    println!("  Problems: {}", problems.len());
    for problem in &problems {
        println!("    {}", problem);
    }
    Err(format!("{} problem(s) in '{}'", problems.len(), rules_path))
}
