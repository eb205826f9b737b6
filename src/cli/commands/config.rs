//! Config command implementation.
//!
//! Reads the fully resolved configuration and edits the database layer.
//! Startup-only keys can't live in the database, so `--set` rejects them.

use serde_json::json;
use std::collections::BTreeMap;
use tracing::info;

use crate::cli::ConfigArgs;
use crate::cli::commands::StoreContext;
use crate::config::{self as cfg, CliOverrides, ConfigLayer, SummarizerConfig};
use crate::error::{Result, SummaryError};

/// Execute the config command.
///
/// # Errors
///
/// Returns an error for a malformed `--set`, a startup-only key, a value the
/// resolved configuration cannot parse, or a store failure.
pub fn execute(args: &ConfigArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let StoreContext { mut storage, .. } = StoreContext::open(cli)?;

    if let Some(pair) = &args.set {
        let (key, value) = parse_assignment(pair)?;
        if cfg::is_startup_key(&key) {
            return Err(SummaryError::validation(
                key,
                "startup-only key; set it in config.yaml, the environment or a flag",
            ));
        }

        // Reject values the engine could not load before persisting them
        let mut candidate = cfg::load_config(Some(&storage), cli)?;
        candidate.runtime.insert(key.clone(), value.clone());
        SummarizerConfig::from_layer(&candidate)?;

        storage.set_config(&key, &value)?;
        info!(%key, %value, "Stored config value");
        if json {
            println!("{}", json!({ "key": key, "value": value }));
        } else {
            println!("Set {key} = {value}");
        }
        return Ok(());
    }

    if let Some(key) = &args.unset {
        let key = cfg::normalize_key(key);
        let removed = storage.delete_config(&key)?;
        if json {
            println!("{}", json!({ "key": key, "removed": removed }));
        } else if removed {
            println!("Removed {key}");
        } else {
            println!("{key} is not set in the database");
        }
        return Ok(());
    }

    let layer = cfg::load_config(Some(&storage), cli)?;

    if let Some(key) = &args.get {
        let key = cfg::normalize_key(key);
        let value = lookup(&layer, &key)
            .ok_or_else(|| SummaryError::validation(key.clone(), "no such config key"))?;
        if json {
            println!("{}", json!({ "key": key, "value": value }));
        } else {
            println!("{value}");
        }
        return Ok(());
    }

    let entries = layer.entries();
    if json {
        let map: BTreeMap<_, _> = entries.into_iter().collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
    } else {
        let width = entries.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in &entries {
            println!("{key:<width$}  {value}");
        }
    }
    Ok(())
}

fn parse_assignment(pair: &str) -> Result<(String, String)> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| SummaryError::validation("set", "expected KEY=VALUE"))?;
    let key = cfg::normalize_key(key);
    if key.is_empty() {
        return Err(SummaryError::validation("set", "empty key"));
    }
    Ok((key, value.trim().to_string()))
}

fn lookup<'a>(layer: &'a ConfigLayer, key: &str) -> Option<&'a String> {
    layer.runtime.get(key).or_else(|| layer.startup.get(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment_normalizes_key() {
        let (key, value) = parse_assignment(" Max_Depth = 3 ").unwrap();
        assert_eq!(key, "max-depth");
        assert_eq!(value, "3");
    }

    #[test]
    fn test_parse_assignment_keeps_equals_in_value() {
        let (key, value) = parse_assignment("summarizer-command=llm --opt=a").unwrap();
        assert_eq!(key, "summarizer-command");
        assert_eq!(value, "llm --opt=a");
    }

    #[test]
    fn test_parse_assignment_rejects_missing_equals() {
        assert!(parse_assignment("max-depth").is_err());
        assert!(parse_assignment("=3").is_err());
    }

    #[test]
    fn test_lookup_prefers_runtime() {
        let mut layer = ConfigLayer::default();
        layer.startup.insert("db".into(), "a.db".into());
        layer.runtime.insert("label".into(), "AISummary".into());
        assert_eq!(lookup(&layer, "db").map(String::as_str), Some("a.db"));
        assert_eq!(lookup(&layer, "label").map(String::as_str), Some("AISummary"));
        assert!(lookup(&layer, "missing").is_none());
    }
}
