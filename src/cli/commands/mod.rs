//! Command implementations.
//!
//! Every command that touches issues goes through [`CommandContext::open`],
//! which resolves configuration, opens the summary store and the tracker,
//! and wires up the engine.

pub mod config;
pub mod enqueue;
pub mod estimate;
pub mod invalidate;
pub mod poll;
pub mod refresh;
pub mod rollup;
pub mod stats;
pub mod summarize;

use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::IssueCache;
use crate::config::{self as cfg, CliOverrides, ConfigPaths, SummarizerConfig};
use crate::engine::Engine;
use crate::error::Result;
use crate::llm::{CommandSummarizer, EchoSummarizer, Summarizer};
use crate::source::{Identity, IssueSource, RetryingSource, SnapshotSource};
use crate::storage::SqliteStorage;

/// Display name used for our writes when none is configured.
pub const DEFAULT_IDENTITY: &str = "AI Summarizer";

/// Store, resolved config and paths: enough for commands that never read issues.
#[derive(Debug)]
pub struct StoreContext {
    pub storage: SqliteStorage,
    pub config: SummarizerConfig,
    pub paths: ConfigPaths,
}

impl StoreContext {
    /// # Errors
    ///
    /// Returns an error if configuration is invalid or the store cannot be opened.
    pub fn open(cli: &CliOverrides) -> Result<Self> {
        let startup = cfg::load_startup_config(cli)?;
        let paths = ConfigPaths::from_layer(&startup);
        debug!(db = %paths.db_path.display(), "Opening summary store");
        let storage = cfg::open_storage(&paths)?;
        let layer = cfg::load_config(Some(&storage), cli)?;
        let config = SummarizerConfig::from_layer(&layer)?;
        Ok(Self {
            storage,
            config,
            paths,
        })
    }
}

/// Everything a summarizing command needs.
#[derive(Debug)]
pub struct CommandContext {
    pub storage: SqliteStorage,
    pub engine: Engine,
    pub paths: ConfigPaths,
}

impl CommandContext {
    /// # Errors
    ///
    /// Returns an error if configuration is invalid, the store cannot be
    /// opened, or the issue snapshot cannot be loaded.
    pub fn open(cli: &CliOverrides) -> Result<Self> {
        let StoreContext {
            storage,
            config,
            paths,
        } = StoreContext::open(cli)?;

        let display_name = config
            .identity
            .clone()
            .unwrap_or_else(|| DEFAULT_IDENTITY.to_string());
        let identity = Identity {
            name: display_name.to_lowercase().replace(' ', "."),
            display_name,
            timezone: "UTC".to_string(),
        };
        let snapshot = SnapshotSource::load(&paths.issues_path, identity)?
            .with_summary_field(config.summary_field.clone());
        let source = RetryingSource::new(snapshot, config.retry);
        let whoami = source.whoami()?;
        info!(identity = %whoami.display_name, issues = %paths.issues_path.display(), "Tracker ready");

        let cache = Arc::new(IssueCache::new(
            Arc::new(source),
            config.levels.clone(),
            config.cache_size,
        ));
        let summarizer: Arc<dyn Summarizer> = match &config.summarizer_command {
            Some(command) => Arc::new(CommandSummarizer::new(
                command.clone(),
                config.max_prompt_tokens,
                config.retry,
            )),
            None => {
                info!("No summarizer-command configured, using the echo summarizer");
                Arc::new(EchoSummarizer::new(config.max_prompt_tokens))
            }
        };

        Ok(Self {
            storage,
            engine: Engine::new(cache, summarizer, config, whoami.display_name),
            paths,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SummarizerConfig {
        &self.engine.config
    }
}
