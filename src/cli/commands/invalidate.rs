//! Invalidate command implementation.
//!
//! Scans the tracker for issues changed in the last window and marks their
//! stored summaries stale. Issues without a stored summary are left alone.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::thread;
use tracing::{debug, info};

use crate::cli::InvalidateArgs;
use crate::cli::commands::CommandContext;
use crate::config::CliOverrides;
use crate::engine::Engine;
use crate::error::{Result, SummaryError};
use crate::model::IssueKey;
use crate::source::IssueQuery;
use crate::storage::{INVALIDATE_WATERMARK_KEY, MarkOutcome, SqliteStorage};
use crate::util::time::{from_stored, saturating_before, to_stored};

/// One scanned window.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateScan {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub found: usize,
    pub marked: Vec<IssueKey>,
}

/// Execute the invalidate command.
///
/// # Errors
///
/// Returns an error for a bad window or any tracker or store failure.
pub fn execute(args: &InvalidateArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let CommandContext {
        mut storage,
        engine,
        ..
    } = CommandContext::open(cli)?;
    let window_secs = i64::try_from(args.window_secs)
        .map_err(|_| SummaryError::validation("window-secs", "too large"))?;
    if window_secs == 0 {
        return Err(SummaryError::validation("window-secs", "must be positive"));
    }
    let window = chrono::Duration::try_seconds(window_secs)
        .ok_or_else(|| SummaryError::validation("window-secs", "too large"))?;

    loop {
        let start = Utc::now();
        // Stay one window behind so late tracker writes land before we scan
        let until = saturating_before(start, window);
        let since = storage
            .get_metadata(INVALIDATE_WATERMARK_KEY)?
            .map(|s| from_stored(&s, INVALIDATE_WATERMARK_KEY))
            .transpose()?
            .unwrap_or_else(|| saturating_before(until, window))
            .min(until);

        let scan = scan_window(&engine, &mut storage, since, until)?;
        storage.set_metadata(INVALIDATE_WATERMARK_KEY, &to_stored(until))?;

        if json {
            println!("{}", serde_json::to_string(&scan)?);
        } else {
            println!(
                "Marked {} of {} issues updated between {} and {} stale",
                scan.marked.len(),
                scan.found,
                scan.since.format("%Y-%m-%d %H:%M:%S"),
                scan.until.format("%Y-%m-%d %H:%M:%S")
            );
        }

        if args.once {
            return Ok(());
        }
        let elapsed = (Utc::now() - start).to_std().unwrap_or_default();
        let sleep = window.to_std().unwrap_or_default().saturating_sub(elapsed);
        debug!(?sleep, "Sleeping until next window");
        thread::sleep(sleep);
    }
}

/// Mark every stored summary for an issue updated in `[since, until)` stale.
///
/// # Errors
///
/// Propagates tracker and store failures.
pub fn scan_window(
    engine: &Engine,
    storage: &mut SqliteStorage,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<InvalidateScan> {
    let query = IssueQuery {
        label: None,
        updated_since: Some(since),
        updated_before: Some(until),
        limit: 0,
    };
    let hits = engine.cache.source().query(&query)?;
    info!(found = hits.len(), %since, %until, "Issues updated in window");

    let mut marked = Vec::new();
    for hit in &hits {
        if storage.mark_stale(&hit.key, false)? == MarkOutcome::Marked {
            info!(key = %hit.key, "Marked stale");
            marked.push(hit.key.clone());
        }
    }

    Ok(InvalidateScan {
        since,
        until,
        found: hits.len(),
        marked,
    })
}
