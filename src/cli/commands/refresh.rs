//! Refresh command implementation.
//!
//! Drains the stale backlog of the summary store: each stale key is rebuilt
//! children first and stored again, which in turn marks its parent stale so
//! the backlog walks up the hierarchy.

use serde_json::json;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cli::RefreshArgs;
use crate::cli::commands::CommandContext;
use crate::config::CliOverrides;
use crate::engine::{Engine, SummarizeOptions, SummaryBuilder};
use crate::error::Result;
use crate::model::IssueKey;
use crate::storage::SqliteStorage;

/// Outcome of one pass over the backlog.
#[derive(Debug, Default)]
pub struct RefreshPass {
    pub refreshed: Vec<IssueKey>,
    pub errors: usize,
}

/// Execute the refresh command.
///
/// # Errors
///
/// Returns an error if the store fails or a transient tracker/model failure
/// occurs with `--once`.
pub fn execute(args: &RefreshArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let CommandContext {
        mut storage,
        engine,
        ..
    } = CommandContext::open(cli)?;
    let idle = Duration::from_secs(args.seconds);

    let mut total = RefreshPass::default();
    loop {
        let stats = storage.stats()?;
        info!(
            total = stats.total,
            stale = stats.stale,
            fresh = stats.fresh,
            "Summary store entries"
        );

        let pass = match refresh_pass(&engine, &mut storage, args.limit) {
            Ok(pass) => pass,
            Err(err) if err.is_transient() && !args.once => {
                warn!(error = %err, "Refresh pass failed, retrying");
                thread::sleep(idle);
                continue;
            }
            Err(err) => return Err(err),
        };

        for key in &pass.refreshed {
            if !json {
                println!("Refreshed {key}");
            }
        }
        let progressed = !pass.refreshed.is_empty();
        total.refreshed.extend(pass.refreshed);
        total.errors += pass.errors;

        if !progressed {
            if args.once {
                break;
            }
            debug!(?idle, "Nothing to refresh, sleeping");
            thread::sleep(idle);
        }
    }

    if json {
        let output = json!({
            "refreshed": total.refreshed,
            "errors": total.errors,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "Refreshed {} summaries ({} errors)",
            total.refreshed.len(),
            total.errors
        );
    }
    Ok(())
}

/// Rebuild up to `limit` stale summaries, lowest hierarchy level first.
///
/// # Errors
///
/// Store failures and transient failures abort the pass; permanent failures
/// for one issue are counted and skipped.
pub fn refresh_pass(
    engine: &Engine,
    storage: &mut SqliteStorage,
    limit: usize,
) -> Result<RefreshPass> {
    let mut pass = RefreshPass::default();
    let mut issues = Vec::new();
    for key in storage.get_stale_issues(limit)? {
        match engine.cache.get(&key) {
            Ok(issue) => issues.push(issue),
            Err(err) if err.is_transient() => return Err(err),
            Err(err) => {
                warn!(%key, error = %err, "Cannot load stale issue");
                pass.errors += 1;
            }
        }
    }
    issues.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.key.cmp(&b.key)));

    // A stale record usually means a child changed only in the store, which
    // the tracker-side currency check cannot see
    let opts = SummarizeOptions::new(engine.config.max_depth).regenerate(true);
    for issue in issues {
        info!(key = %issue.key, "Refreshing summary");
        let summary = match SummaryBuilder::new(engine, storage).summarize(&issue, opts) {
            Ok(summary) => summary,
            Err(err) if err.is_transient() => return Err(err),
            Err(err) => {
                warn!(key = %issue.key, error = %err, "Refresh failed");
                pass.errors += 1;
                continue;
            }
        };
        storage.update_summary(&issue.key, &summary, issue.parent_key.as_ref())?;
        debug!(key = %issue.key, %summary, "Updated summary");
        pass.refreshed.push(issue.key.clone());
    }
    Ok(pass)
}
