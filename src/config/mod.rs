//! Configuration management for `aisummary`.
//!
//! Sources, lowest to highest precedence:
//! 1. Built-in defaults
//! 2. Database `config` table (runtime keys only)
//! 3. User config (`~/.config/aisum/config.yaml`)
//! 4. Project config (`.aisum/config.yaml` or `--config`)
//! 5. Environment (`AISUM_*`, plus the legacy `ALLOWED_PROJECTS`)
//! 6. Command line flags
//!
//! Startup keys (paths, identity, lock timeout) are never read from the
//! database because they are needed before it is opened.

use std::collections::{BTreeSet, HashMap};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::engine::{DEFAULT_UNLABELED_POLICY, UnlabeledPolicy};
use crate::error::{Result, SummaryError};
use crate::model::{Issue, LevelTable};
use crate::storage::SqliteStorage;
use crate::util::RetryPolicy;

/// Directory holding project config, database and snapshot.
pub const PROJECT_DIR: &str = ".aisum";
const DEFAULT_DB_FILENAME: &str = "summaries.db";
const DEFAULT_ISSUES_FILENAME: &str = "issues.jsonl";
const ENV_PREFIX: &str = "AISUM_";

/// A configuration layer split into startup-only and runtime (DB) keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub startup: HashMap<String, String>,
    pub runtime: HashMap<String, String>,
}

impl ConfigLayer {
    /// Merge another layer on top of this one (higher precedence wins).
    pub fn merge_from(&mut self, other: &Self) {
        for (key, value) in &other.startup {
            self.startup.insert(key.clone(), value.clone());
        }
        for (key, value) in &other.runtime {
            self.runtime.insert(key.clone(), value.clone());
        }
    }

    /// Merge multiple layers in precedence order (lowest to highest).
    #[must_use]
    pub fn merge_layers(layers: &[Self]) -> Self {
        let mut merged = Self::default();
        for layer in layers {
            merged.merge_from(layer);
        }
        merged
    }

    /// Build a layer from a YAML file path. Missing files return empty config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let value: serde_yaml::Value = serde_yaml::from_str(&contents)?;
        Ok(layer_from_yaml_value(&value))
    }

    /// Build a layer from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_vars(env::vars())
    }

    /// Build a layer from `(name, value)` pairs shaped like environment variables.
    ///
    /// `AISUM_MAX_DEPTH` becomes `max-depth`, `AISUM_RETRY__MAX_ATTEMPTS`
    /// becomes `retry.max-attempts`.
    #[must_use]
    pub fn from_env_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut layer = Self::default();

        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let normalized = stripped.to_lowercase().replace("__", ".").replace('_', "-");
                insert_key_value(&mut layer, &normalized, value);
            } else if key == "ALLOWED_PROJECTS" {
                layer
                    .runtime
                    .entry("allowed-projects".to_string())
                    .or_insert(value);
            }
        }

        layer
    }

    /// Build a layer from DB config table values.
    ///
    /// # Errors
    ///
    /// Returns an error if config table lookup fails.
    pub fn from_db(storage: &SqliteStorage) -> Result<Self> {
        let mut layer = Self::default();
        let map = storage.get_all_config()?;
        for (key, value) in map {
            if is_startup_key(&key) {
                continue;
            }
            layer.runtime.insert(normalize_key(&key), value);
        }
        Ok(layer)
    }

    /// Every key with its value, sorted, startup keys included.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut all: Vec<(String, String)> = self
            .startup
            .iter()
            .chain(self.runtime.iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort();
        all
    }
}

/// CLI overrides for config loading (optional).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub db: Option<PathBuf>,
    pub issues: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub json: Option<bool>,
    pub lock_timeout: Option<u64>,
    pub max_depth: Option<usize>,
}

impl CliOverrides {
    #[must_use]
    pub fn as_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::default();

        if let Some(path) = &self.db {
            insert_key_value(&mut layer, "db", path.to_string_lossy().to_string());
        }
        if let Some(path) = &self.issues {
            insert_key_value(&mut layer, "issues", path.to_string_lossy().to_string());
        }
        if let Some(json) = self.json {
            insert_key_value(&mut layer, "json", json.to_string());
        }
        if let Some(lock_timeout) = self.lock_timeout {
            insert_key_value(&mut layer, "lock-timeout", lock_timeout.to_string());
        }
        if let Some(max_depth) = self.max_depth {
            insert_key_value(&mut layer, "max-depth", max_depth.to_string());
        }

        layer
    }
}

/// Load project config (`.aisum/config.yaml`, or an explicit path).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(explicit: Option<&Path>) -> Result<ConfigLayer> {
    match explicit {
        Some(path) if !path.exists() => Err(SummaryError::Config(format!(
            "config file not found: {}",
            path.display()
        ))),
        Some(path) => ConfigLayer::from_yaml(path),
        None => ConfigLayer::from_yaml(&Path::new(PROJECT_DIR).join("config.yaml")),
    }
}

/// Load user config (`~/.config/aisum/config.yaml`).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<ConfigLayer> {
    let Ok(home) = env::var("HOME") else {
        return Ok(ConfigLayer::default());
    };
    let path = Path::new(&home)
        .join(".config")
        .join("aisum")
        .join("config.yaml");
    ConfigLayer::from_yaml(&path)
}

/// Load startup configuration layers (YAML + env + CLI, no DB).
///
/// # Errors
///
/// Returns an error if any config file cannot be read or parsed.
pub fn load_startup_config(cli: &CliOverrides) -> Result<ConfigLayer> {
    Ok(ConfigLayer::merge_layers(&[
        load_user_config()?,
        load_project_config(cli.config.as_deref())?,
        ConfigLayer::from_env(),
        cli.as_layer(),
    ]))
}

/// Default config layer (lowest precedence).
#[must_use]
pub fn default_config_layer() -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    for (key, value) in [
        ("label", "AISummary"),
        ("summary-field", "Status Summary"),
        ("max-depth", "1"),
        ("cache-size", "5000"),
        ("wrap-column", "78"),
        ("inactive-days", "14"),
        ("batch-limit", "150"),
        ("poll-interval-secs", "300"),
        ("max-prompt-tokens", "32000"),
    ] {
        layer.runtime.insert(key.to_string(), value.to_string());
    }
    layer
}

/// Load configuration with full precedence order.
///
/// # Errors
///
/// Returns an error if any config file cannot be read or parsed, or DB access fails.
pub fn load_config(storage: Option<&SqliteStorage>, cli: &CliOverrides) -> Result<ConfigLayer> {
    let db_layer = match storage {
        Some(storage) => ConfigLayer::from_db(storage)?,
        None => ConfigLayer::default(),
    };
    Ok(ConfigLayer::merge_layers(&[
        default_config_layer(),
        db_layer,
        load_startup_config(cli)?,
    ]))
}

/// Where the database and the issue snapshot live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub db_path: PathBuf,
    pub issues_path: PathBuf,
    pub lock_timeout: Option<u64>,
}

impl ConfigPaths {
    /// Resolve paths from startup keys, defaulting into `.aisum/`.
    #[must_use]
    pub fn from_layer(layer: &ConfigLayer) -> Self {
        let path_or = |keys: &[&str], default: &str| {
            get_startup_value(layer, keys)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map_or_else(|| Path::new(PROJECT_DIR).join(default), PathBuf::from)
        };
        Self {
            db_path: path_or(&["db", "database"], DEFAULT_DB_FILENAME),
            issues_path: path_or(&["issues", "issues-file"], DEFAULT_ISSUES_FILENAME),
            lock_timeout: get_startup_value(layer, &["lock-timeout"])
                .and_then(|v| v.trim().parse::<u64>().ok()),
        }
    }
}

/// Open the summary store, creating its directory if needed.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the database opened.
pub fn open_storage(paths: &ConfigPaths) -> Result<SqliteStorage> {
    if let Some(parent) = paths.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    SqliteStorage::open_with_timeout(&paths.db_path, paths.lock_timeout)
}

/// Resolved, typed settings for the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummarizerConfig {
    /// Opt-in label
    pub label: String,
    pub allowed_projects: BTreeSet<String>,
    /// Changelog author name for our own writes; `None` asks the tracker
    pub identity: Option<String>,
    /// Older author names whose writes also count as ours
    pub legacy_identities: Vec<String>,
    /// Tracker field holding the AI summary
    pub summary_field: String,
    pub levels: LevelTable,
    pub unlabeled_policy: UnlabeledPolicy,
    pub max_depth: usize,
    pub cache_size: usize,
    pub wrap_column: usize,
    pub inactive_days: i64,
    pub batch_limit: usize,
    pub poll_interval_secs: u64,
    pub summarizer_command: Option<String>,
    pub max_prompt_tokens: usize,
    #[serde(skip)]
    pub retry: RetryPolicy,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            label: "AISummary".to_string(),
            allowed_projects: BTreeSet::new(),
            identity: None,
            legacy_identities: Vec::new(),
            summary_field: "Status Summary".to_string(),
            levels: LevelTable::default(),
            unlabeled_policy: DEFAULT_UNLABELED_POLICY,
            max_depth: 1,
            cache_size: 5000,
            wrap_column: 78,
            inactive_days: 14,
            batch_limit: 150,
            poll_interval_secs: 300,
            summarizer_command: None,
            max_prompt_tokens: 32_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl SummarizerConfig {
    /// Resolve from a merged layer. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a config error naming the key for any value that does not parse.
    pub fn from_layer(layer: &ConfigLayer) -> Result<Self> {
        let mut config = Self::default();

        if let Some(label) = get_value(layer, &["label"]) {
            config.label = label.trim().to_string();
        }
        if let Some(projects) = get_value(layer, &["allowed-projects", "allowed_projects"]) {
            config.allowed_projects = split_csv(projects).collect();
        }
        config.identity = get_startup_value(layer, &["identity"])
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        if let Some(legacy) = get_value(layer, &["legacy-identities", "legacy_identities"]) {
            config.legacy_identities = split_csv(legacy).collect();
        }
        if let Some(field) = get_value(layer, &["summary-field", "summary_field"]) {
            config.summary_field = field.trim().to_string();
        }
        if let Some(policy) = get_value(layer, &["unlabeled-policy", "unlabeled_policy"]) {
            config.unlabeled_policy = policy.parse()?;
        }
        if let Some(command) = get_value(layer, &["summarizer-command", "summarizer_command"]) {
            config.summarizer_command = Some(command.trim().to_string()).filter(|c| !c.is_empty());
        }

        config.max_depth = parse_or(layer, &["max-depth", "max_depth"], config.max_depth)?;
        config.cache_size = parse_or(layer, &["cache-size", "cache_size"], config.cache_size)?;
        config.wrap_column = parse_or(layer, &["wrap-column", "wrap_column"], config.wrap_column)?;
        config.inactive_days =
            parse_or(layer, &["inactive-days", "inactive_days"], config.inactive_days)?;
        config.batch_limit = parse_or(layer, &["batch-limit", "batch_limit"], config.batch_limit)?;
        config.poll_interval_secs = parse_or(
            layer,
            &["poll-interval-secs", "poll_interval_secs"],
            config.poll_interval_secs,
        )?;
        config.max_prompt_tokens = parse_or(
            layer,
            &["max-prompt-tokens", "max_prompt_tokens"],
            config.max_prompt_tokens,
        )?;

        config.retry.max_attempts = parse_or(
            layer,
            &["retry.max-attempts", "retry.max_attempts"],
            config.retry.max_attempts,
        )?;
        config.retry.multiplier =
            parse_or(layer, &["retry.multiplier"], config.retry.multiplier)?;
        config.retry.initial_backoff = Duration::from_millis(parse_or(
            layer,
            &["retry.initial-backoff-ms", "retry.initial_backoff_ms"],
            duration_millis(config.retry.initial_backoff),
        )?);
        config.retry.max_backoff = Duration::from_millis(parse_or(
            layer,
            &["retry.max-backoff-ms", "retry.max_backoff_ms"],
            duration_millis(config.retry.max_backoff),
        )?);

        for (key, value) in &layer.runtime {
            let Some(issue_type) = key.strip_prefix("levels.") else {
                continue;
            };
            let level = value.trim().parse::<u32>().map_err(|_| {
                SummaryError::Config(format!("{key}: expected a non-negative integer, got {value:?}"))
            })?;
            let known = config
                .levels
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(issue_type))
                .map(|(name, _)| name.to_string());
            config.levels.set(known.unwrap_or_else(|| issue_type.to_string()), level);
        }

        Ok(config)
    }

    /// An issue may get a posted summary only if it carries the opt-in label
    /// and belongs to an allowed project.
    #[must_use]
    pub fn is_eligible(&self, issue: &Issue) -> bool {
        issue.has_label(&self.label) && self.allowed_projects.contains(&issue.project_key)
    }
}

/// Determine if a key is startup-only.
///
/// Startup-only keys can only come from YAML, the environment or flags.
#[must_use]
pub fn is_startup_key(key: &str) -> bool {
    matches!(
        normalize_key(key).as_str(),
        "db" | "database"
            | "issues"
            | "issues-file"
            | "identity"
            | "json"
            | "lock-timeout"
            | "log-file"
    )
}

fn insert_key_value(layer: &mut ConfigLayer, key: &str, value: String) {
    let key = normalize_key(key);
    if is_startup_key(&key) {
        layer.startup.insert(key, value);
    } else {
        layer.runtime.insert(key, value);
    }
}

/// Canonical form of a config key: trimmed, lowercase, `-` separated.
#[must_use]
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('_', "-")
}

fn split_csv(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn get_startup_value<'a>(layer: &'a ConfigLayer, keys: &[&str]) -> Option<&'a String> {
    keys.iter()
        .find_map(|key| layer.startup.get(&normalize_key(key)))
}

fn get_value<'a>(layer: &'a ConfigLayer, keys: &[&str]) -> Option<&'a String> {
    keys.iter().find_map(|key| {
        layer
            .runtime
            .get(*key)
            .or_else(|| layer.runtime.get(&normalize_key(key)))
    })
}

fn parse_or<T: std::str::FromStr>(layer: &ConfigLayer, keys: &[&str], default: T) -> Result<T> {
    match get_value(layer, keys) {
        Some(value) => value.trim().parse::<T>().map_err(|_| {
            SummaryError::Config(format!("{}: cannot parse {value:?}", keys[0]))
        }),
        None => Ok(default),
    }
}

fn layer_from_yaml_value(value: &serde_yaml::Value) -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    let mut flat = HashMap::new();
    flatten_yaml(value, "", &mut flat);

    for (key, value) in flat {
        // Level table keys keep their issue-type spelling
        if let Some(issue_type) = key.strip_prefix("levels.") {
            layer.runtime.insert(format!("levels.{issue_type}"), value);
        } else {
            insert_key_value(&mut layer, &key, value);
        }
    }

    layer
}

fn flatten_yaml(value: &serde_yaml::Value, prefix: &str, out: &mut HashMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key_str) = key.as_str() else {
                    continue;
                };
                let next_prefix = if prefix.is_empty() {
                    key_str.to_string()
                } else {
                    format!("{prefix}.{key_str}")
                };
                flatten_yaml(value, &next_prefix, out);
            }
        }
        serde_yaml::Value::Sequence(values) => {
            let joined = values
                .iter()
                .filter_map(yaml_scalar_to_string)
                .collect::<Vec<_>>()
                .join(",");
            out.insert(prefix.to_string(), joined);
        }
        _ => {
            if let Some(value) = yaml_scalar_to_string(value) {
                out.insert(prefix.to_string(), value);
            }
        }
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Bool(v) => Some(v.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Null
        | serde_yaml::Value::Sequence(_)
        | serde_yaml::Value::Mapping(_) => None,
        serde_yaml::Value::Tagged(tagged) => yaml_scalar_to_string(&tagged.value),
    }
}
