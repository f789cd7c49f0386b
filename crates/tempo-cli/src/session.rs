use std::collections::BTreeSet;
use std::fs;

use tempo_core::document::{Source, TabState};
use tempo_core::patch::Patch;
use tempo_core::storage::Storage;
use tempo_core::store::StateStore;
use tempo_core::types::{TabId, ViewKey, ViewMask};
use tempo_sync::{Authority, AuthorityStore, FileStorage, SyncConfig, ViewSubscription};

fn open_store(dir: &str, config: &SyncConfig) -> Result<AuthorityStore<FileStorage>, String> {
    StateStore::open(FileStorage::new(dir), config.store.clone())
        .map_err(|e| format!("Failed to open document in '{}': {}", dir, e))
}

pub fn cmd_inspect(dir: &str, config: &SyncConfig) -> Result<(), String> {
    let storage = FileStorage::new(dir);
    let key = &config.store.storage_key;
    if storage
        .load(key)
        .map_err(|e| format!("Failed to read '{}': {}", storage.path_for(key).display(), e))?
        .is_none()
    {
        println!("No document stored under '{}' (defaults apply)", storage.path_for(key).display());
        return Ok(());
    }

    let store = open_store(dir, config)?;
    let doc = store.document();
    let settings = &doc.settings;

    println!("Document: {}", storage.path_for(key).display());
    println!("Settings:");
    println!("  Enabled:  {}", settings.enabled);
    println!("  Pinned:   {}", settings.is_pinned);
    println!("  Speed:    {}x", settings.speed);
    println!(
        "  Presets:  {}",
        settings
            .speed_presets
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Fx:       {}", if settings.fx.is_active() { "active" } else { "neutral" });
    println!();
    println!("Rules: {}", doc.rules.len());
    for (i, rule) in doc.rules.iter().enumerate() {
        let mut flags = Vec::new();
        if !rule.enabled {
            flags.push("disabled");
        }
        if rule.initial_load_only {
            flags.push("initial-load");
        }
        if rule.strict {
            flags.push("strict");
        }
        println!(
            "  [{}] {} {:?} {:?} '{}' {}",
            i,
            rule.id,
            rule.target(),
            rule.match_type,
            rule.pattern,
            flags.join(",")
        );
    }
    Ok(())
}

/// Replays a session script (a JSON array of patches) against a
/// file-backed authority and prints every touched tab after each step.
pub fn cmd_simulate(dir: &str, script_path: &str, config: &SyncConfig) -> Result<(), String> {
    let text = fs::read_to_string(script_path)
        .map_err(|e| format!("Failed to read '{}': {}", script_path, e))?;
    let steps: Vec<Patch> = serde_json::from_str(&text)
        .map_err(|e| format!("Invalid session script '{}': {}", script_path, e))?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    runtime.block_on(simulate(dir, steps, config))
}

async fn simulate(dir: &str, steps: Vec<Patch>, config: &SyncConfig) -> Result<(), String> {
    let store = open_store(dir, config)?;
    let (client, handle) = Authority::spawn(store, config);

    let mut settings_view = ViewSubscription::open(
        client.clone(),
        ViewKey::global(ViewMask::SETTINGS | ViewMask::RULES),
        config,
    );
    settings_view
        .ready()
        .await
        .map_err(|e| format!("Authority did not answer: {}", e))?;

    for (i, step) in steps.into_iter().enumerate() {
        let tabs: BTreeSet<TabId> = step.tabs.iter().map(|edit| edit.tab()).collect();
        match client.patch(step).await {
            Ok(ack) => println!(
                "step {} -> revision {} changed {:?}",
                i + 1,
                ack.revision,
                ack.changed
            ),
            Err(e) => println!("step {} -> {}", i + 1, e),
        }

        let changed = settings_view.pump().changed;
        if !changed.is_empty() {
            let view = settings_view.view();
            println!(
                "  settings: enabled={} speed={}x rules={}",
                view.enabled.unwrap_or_default(),
                view.speed.unwrap_or_default(),
                view.rules.map(|r| r.len()).unwrap_or_default()
            );
        }

        for tab in tabs {
            let delta = client
                .read(ViewKey::for_tab(ViewMask::TAB, tab))
                .await
                .map_err(|e| format!("Failed to read tab {}: {}", tab, e))?;
            match delta.view.tab {
                Some(state) => println!("  tab {}: {}", tab, describe_tab(&state)),
                None => println!("  tab {}: closed", tab),
            }
        }
    }

    settings_view
        .close()
        .map_err(|e| format!("Failed to close view: {}", e))?;
    let status = client
        .status()
        .await
        .map_err(|e| format!("Failed to query authority: {}", e))?;
    drop(client);
    drop(settings_view);
    let store = handle
        .await
        .map_err(|e| format!("Authority task failed: {}", e))?;

    println!(
        "Final revision {} ({} rules), persisted: {}",
        status.revision,
        store.document().rules.len(),
        !store.is_dirty()
    );
    Ok(())
}

pub fn describe_tab(tab: &TabState) -> String {
    format!(
        "{} enabled={}{} speed={}x{} fx={}{}",
        tab.url,
        tab.enabled,
        describe_source(&tab.provenance.enabled),
        tab.speed,
        describe_source(&tab.provenance.speed),
        if tab.fx.is_active() { "active" } else { "neutral" },
        describe_source(&tab.provenance.fx),
    )
}

fn describe_source(source: &Source) -> String {
    match source {
        Source::Default => String::new(),
        Source::Rule(id) => format!(" [rule {}]", id),
        Source::Manual => " [manual]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_core::document::ManualOverride;

    #[test]
    fn test_describe_tab_shows_sources() {
        let mut tab = TabState::observed("https://a.com/", true);
        tab.speed = 2.0;
        tab.provenance.speed = Source::Rule("r1".into());
        tab.manual = ManualOverride::default();
        let text = describe_tab(&tab);
        assert!(text.contains("enabled=true speed=2x [rule r1] fx=neutral"));
    }

    #[test]
    fn test_simulate_persists_rules() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("session.json");
        fs::write(
            &script,
            r#"[
                {"rules": [{"op": "upsert", "rule": {"id": "r1", "enabled": true,
                    "initialLoadOnly": false, "strict": false, "matchType": "CONTAINS",
                    "match": "twitch.tv", "override": {"type": "SPEED", "value": 2.0}}}]},
                {"tabs": [{"op": "navigate", "tab": 1, "url": "https://twitch.tv/", "initialLoad": true}]},
                {"tabs": [{"op": "close", "tab": 1}]}
            ]"#,
        )
        .unwrap();
        let store_dir = dir.path().join("store");
        let store_dir = store_dir.to_string_lossy().to_string();
        let config = SyncConfig::default();

        cmd_simulate(&store_dir, &script.to_string_lossy(), &config).unwrap();

        let store = open_store(&store_dir, &config).unwrap();
        assert_eq!(store.document().rules.len(), 1);
        assert!(store.document().tabs.is_empty());
        cmd_inspect(&store_dir, &config).unwrap();
    }

    #[test]
    fn test_inspect_without_document() {
        let dir = tempfile::tempdir().unwrap();
        cmd_inspect(&dir.path().to_string_lossy(), &SyncConfig::default()).unwrap();
    }
}
