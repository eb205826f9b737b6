#![allow(dead_code)]

pub mod cli;
pub mod fixtures;

use aisummary::cache::IssueCache;
use aisummary::config::SummarizerConfig;
use aisummary::engine::Engine;
use aisummary::error::{ErrorClass, Result, SummaryError};
use aisummary::llm::{Summarizer, estimate_tokens};
use aisummary::model::{IssueKey, LevelTable};
use aisummary::source::{Identity, SnapshotRecord, SnapshotSource};
use aisummary::storage::SqliteStorage;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Instant;
use tracing::info;

pub const BOT_NAME: &str = "Summary Bot";
pub const LEGACY_BOT_NAME: &str = "Old Summary Bot";

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        aisummary::logging::init_test_logging();
    });
}

pub struct TestLogGuard {
    name: String,
    start: Instant,
}

impl TestLogGuard {
    fn new(name: &str) -> Self {
        init_test_logging();
        info!("{name}: starting");
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for TestLogGuard {
    fn drop(&mut self) {
        info!(
            "{}: assertions passed (elapsed {:?})",
            self.name,
            self.start.elapsed()
        );
    }
}

pub fn test_log(name: &str) -> TestLogGuard {
    TestLogGuard::new(name)
}

pub fn test_db() -> SqliteStorage {
    init_test_logging();
    SqliteStorage::open_memory().expect("Failed to create test database")
}

pub fn key(s: &str) -> IssueKey {
    IssueKey::parse(s).expect("valid key")
}

pub fn identity() -> Identity {
    Identity {
        name: "summary.bot".to_string(),
        display_name: BOT_NAME.to_string(),
        timezone: "UTC".to_string(),
    }
}

/// Config with project `A` allowed and the default label.
pub fn test_config() -> SummarizerConfig {
    SummarizerConfig {
        allowed_projects: BTreeSet::from(["A".to_string()]),
        legacy_identities: vec![LEGACY_BOT_NAME.to_string()],
        ..SummarizerConfig::default()
    }
}

/// Summarizer that counts calls and records every prompt.
#[derive(Debug, Default)]
pub struct CountingSummarizer {
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    fail_transient: AtomicUsize,
}

impl CountingSummarizer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Fail the next `n` calls with a transient error.
    pub fn fail_next(&self, n: usize) {
        self.fail_transient.store(n, Ordering::SeqCst);
    }
}

impl Summarizer for CountingSummarizer {
    fn complete(&self, prompt: &str) -> Result<String> {
        if self
            .fail_transient
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SummaryError::Summarizer {
                class: ErrorClass::Transient,
                message: "model overloaded".to_string(),
            });
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().unwrap().push(prompt.to_string());
        let title = prompt
            .lines()
            .find_map(|line| line.strip_prefix("Title: "))
            .unwrap_or("untitled");
        Ok(format!("Summary #{n} of {title}."))
    }

    fn count_tokens(&self, text: &str) -> Result<usize> {
        estimate_tokens(text, 32_000)
    }
}

/// An in-memory tracker, its cache and an engine wired to a counting model.
pub struct Harness {
    pub source: Arc<SnapshotSource>,
    pub summarizer: Arc<CountingSummarizer>,
    pub engine: Engine,
}

impl Harness {
    pub fn new(records: Vec<SnapshotRecord>) -> Self {
        Self::with_config(records, test_config())
    }

    pub fn with_config(records: Vec<SnapshotRecord>, config: SummarizerConfig) -> Self {
        init_test_logging();
        let source = Arc::new(SnapshotSource::from_records(records, identity()));
        let cache = Arc::new(IssueCache::new(
            source.clone(),
            LevelTable::default(),
            config.cache_size,
        ));
        let summarizer = Arc::new(CountingSummarizer::default());
        let engine = Engine::new(cache, summarizer.clone(), config, BOT_NAME);
        Self {
            source,
            summarizer,
            engine,
        }
    }

    pub fn issue(&self, k: &str) -> Arc<aisummary::model::Issue> {
        self.engine.cache.get(&key(k)).expect("issue exists")
    }
}
