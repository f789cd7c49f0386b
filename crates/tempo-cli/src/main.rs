//! Tempo CLI
//!
//! CLI tool for checking rule files, resolving URLs and working with stored
//! documents.

use std::fs;

use clap::{ArgAction, Parser, Subcommand};
use tempo_sync::SyncConfig;

mod rules;
mod session;

#[derive(Parser)]
#[command(name = "tempo-cli")]
#[command(about = "Tempo rule engine and state store tools")]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON config file (store and sync settings)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Storage key of the document, overrides the config file
    #[arg(long, global = true)]
    storage_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the overrides a URL gets from a rule file
    Resolve {
        /// Rule file (JSON array of rules, or a stored document)
        #[arg(short, long)]
        rules: String,

        /// URL to resolve
        url: String,

        /// URL of the initial load, for in-page navigations
        #[arg(long)]
        load_url: Option<String>,

        /// Treat `url` as an in-page navigation
        #[arg(long)]
        in_page: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report malformed rules (invalid regex, out-of-range speed, empty pattern, duplicate id)
    Check {
        /// Rule file to check
        #[arg(short, long)]
        rules: String,
    },

    /// Dump a stored document
    Inspect {
        /// Storage directory
        #[arg(short, long)]
        dir: String,
    },

    /// Replay a session script (JSON array of patches) against a stored document
    Simulate {
        /// Storage directory
        #[arg(short, long)]
        dir: String,

        /// Session script
        #[arg(short, long)]
        script: String,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn load_config(path: Option<&str>, storage_key: Option<String>) -> Result<SyncConfig, String> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read '{}': {}", path, e))?;
            serde_json::from_str(&text).map_err(|e| format!("Invalid config '{}': {}", path, e))?
        }
        None => SyncConfig::default(),
    };
    if let Some(key) = storage_key {
        config.store.storage_key = key;
    }
    Ok(config)
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = load_config(cli.config.as_deref(), cli.storage_key).and_then(|config| {
        match cli.command {
            Commands::Resolve {
                rules,
                url,
                load_url,
                in_page,
                json,
            } => rules::cmd_resolve(rules::ResolveOptions {
                rules_path: rules,
                url,
                load_url,
                in_page,
                json,
            }),
            Commands::Check { rules } => rules::cmd_check(&rules),
            Commands::Inspect { dir } => session::cmd_inspect(&dir, &config),
            Commands::Simulate { dir, script } => session::cmd_simulate(&dir, &script, &config),
        }
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_resolve() {
        let cli = Cli::try_parse_from([
            "tempo-cli",
            "-vv",
            "resolve",
            "--rules",
            "rules.json",
            "https://twitch.tv/",
            "--in-page",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Resolve { in_page: true, .. }));
    }

    #[test]
    fn test_flag_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let json = r#"{"store": {"storageKey": "from-file", "persistAttempts": 7}}"#;
        fs::write(&path, json).unwrap();
        let path = path.to_string_lossy().to_string();

        let config = load_config(Some(&path), None).unwrap();
        assert_eq!(config.store.storage_key, "from-file");
        let config = load_config(Some(&path), Some("from-flag".to_string())).unwrap();
        assert_eq!(config.store.storage_key, "from-flag");
        assert_eq!(config.store.persist_attempts, 7);
    }
}
