//! CLI definitions and entry point.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Keep AI status summaries of tracker issues fresh
#[derive(Parser, Debug)]
#[command(name = "aisum", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Summary database path (default: .aisum/summaries.db)
    #[arg(long, global = true, env = "AISUM_DB")]
    pub db: Option<PathBuf>,

    /// Issue snapshot file (default: .aisum/issues.jsonl)
    #[arg(long, global = true, env = "AISUM_ISSUES")]
    pub issues: Option<PathBuf>,

    /// Project config file (default: .aisum/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// `SQLite` busy timeout in ms
    #[arg(long, global = true)]
    pub lock_timeout: Option<u64>,

    /// Append logs to this file as well as stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarize one issue, recursing into its children
    Summarize(SummarizeArgs),

    /// Poll for labeled issues that changed and keep their summaries fresh
    Poll(PollArgs),

    /// Rebuild summaries the store has marked stale
    Refresh(RefreshArgs),

    /// Mark stored summaries stale for recently changed issues
    Invalidate(InvalidateArgs),

    /// Queue an issue for summarization by marking it stale
    Enqueue(EnqueueArgs),

    /// Show summary store totals
    Stats,

    /// Estimate prompt sizes for recently changed issues
    Estimate(EstimateArgs),

    /// Collect summaries and contributors under a root issue
    Rollup(RollupArgs),

    /// Inspect or change configuration stored in the database
    Config(ConfigArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct SummarizeArgs {
    /// Issue key, e.g. ABC-123
    pub key: String,

    /// Levels of ineligible children to recurse into
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Do not post summaries back to the tracker
    #[arg(long)]
    pub no_update: bool,

    /// Rebuild even if the current summary is up to date
    #[arg(long)]
    pub regenerate: bool,

    /// Print the prompt instead of calling the model
    #[arg(long)]
    pub prompt_only: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct PollArgs {
    /// Levels of ineligible children to recurse into
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Maximum issues fetched per iteration
    #[arg(long)]
    pub limit: Option<usize>,

    /// Start from this time instead of the saved watermark
    /// (RFC3339, YYYY-MM-DD, or relative like -7d)
    #[arg(long, allow_hyphen_values = true)]
    pub modified_since: Option<String>,

    /// Do not post summaries back to the tracker
    #[arg(long)]
    pub no_update: bool,

    /// Seconds between iterations
    #[arg(long)]
    pub seconds: Option<u64>,

    /// Run a single iteration and exit
    #[arg(long)]
    pub once: bool,

    /// Drop cached issues older than this at the end of each iteration (e.g. 1h)
    #[arg(long)]
    pub clear_cache: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RefreshArgs {
    /// Maximum stale summaries per pass (0 = all)
    #[arg(long, default_value_t = 100)]
    pub limit: usize,

    /// Stop once the backlog is drained instead of waiting for more
    #[arg(long)]
    pub once: bool,

    /// Seconds to wait when the backlog is empty
    #[arg(long, default_value_t = 60)]
    pub seconds: u64,
}

#[derive(Args, Debug, Clone, Default)]
pub struct InvalidateArgs {
    /// Width of each scan window in seconds
    #[arg(long, default_value_t = 60)]
    pub window_secs: u64,

    /// Scan one window and exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EnqueueArgs {
    /// Issue keys to queue
    #[arg(required = true)]
    pub keys: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EstimateArgs {
    /// Only issues updated at or after this time (default: -1d)
    #[arg(long, allow_hyphen_values = true)]
    pub since: Option<String>,

    /// Print CSV instead of a table
    #[arg(long)]
    pub csv: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RollupArgs {
    /// Root issue key, e.g. an initiative
    pub key: String,

    /// Days without change before an issue counts as inactive
    #[arg(long)]
    pub inactive_days: Option<i64>,

    /// Condense each item and the whole rollup for leadership
    #[arg(long)]
    pub exec: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// List every resolved key and value
    #[arg(long, conflicts_with_all = ["get", "set", "unset"])]
    pub list: bool,

    /// Print one resolved value
    #[arg(long, value_name = "KEY")]
    pub get: Option<String>,

    /// Store a value in the database (KEY=VALUE)
    #[arg(long, value_name = "KEY=VALUE")]
    pub set: Option<String>,

    /// Remove a value from the database
    #[arg(long, value_name = "KEY")]
    pub unset: Option<String>,
}
