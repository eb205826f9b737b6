//! Poll command implementation: the summary bot loop.
//!
//! Each iteration selects labeled issues changed since the watermark (plus
//! their eligible ancestors), summarizes them children first, and advances
//! the watermark. A transient failure leaves the watermark where it was so
//! the next iteration retries the same window; a permanent failure for one
//! issue skips that issue and is counted.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cli::PollArgs;
use crate::cli::commands::CommandContext;
use crate::config::CliOverrides;
use crate::engine::{
    Engine, SummarizeOptions, SummaryBuilder, next_watermark, select_for_iteration,
};
use crate::error::{Result, SummaryError};
use crate::storage::{SqliteStorage, WATERMARK_KEY};
use crate::util::time::{
    epoch_floor, from_stored, parse_duration, parse_flexible_timestamp, saturating_before, to_stored,
};
use crate::util::{IterationStats, Timers};

/// Execute the poll command.
///
/// # Errors
///
/// Returns an error for invalid arguments, a permanent iteration failure, or
/// (with `--once`) any iteration failure.
pub fn execute(args: &PollArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let CommandContext {
        mut storage,
        engine,
        ..
    } = CommandContext::open(cli)?;

    let limit = args.limit.unwrap_or(engine.config.batch_limit);
    let delay = Duration::from_secs(args.seconds.unwrap_or(engine.config.poll_interval_secs));
    let opts = SummarizeOptions::new(args.max_depth.unwrap_or(engine.config.max_depth))
        .send_updates(!args.no_update);
    let cache_max_age = args
        .clear_cache
        .as_deref()
        .map(|s| {
            parse_duration(s).ok_or_else(|| {
                SummaryError::validation("clear-cache", format!("not a duration: {s:?}"))
            })
        })
        .transpose()?;

    let mut since = match &args.modified_since {
        Some(s) => parse_flexible_timestamp(s, "modified-since")?,
        None => storage
            .get_metadata(WATERMARK_KEY)?
            .map(|s| from_stored(&s, WATERMARK_KEY))
            .transpose()?
            .unwrap_or_else(epoch_floor),
    };

    let timers = Timers::new();
    loop {
        let started = Instant::now();
        info!(%since, "Starting iteration");

        match run_iteration(&engine, &mut storage, since, limit, opts, json, &timers) {
            Ok((stats, next)) => {
                since = next;
                storage.set_metadata(WATERMARK_KEY, &to_stored(since))?;
                info!(watermark = %since, "Got updates through watermark");
                if json {
                    let output = json!({ "stats": stats, "watermark": since });
                    println!("{}", serde_json::to_string(&output)?);
                } else {
                    println!("Iteration: {stats}");
                }
            }
            Err(err) if err.is_transient() && !args.once => {
                warn!(error = %err, %since, "Iteration failed, will retry the same window");
            }
            Err(err) => return Err(err),
        }
        debug!(timers = %timers.report(), "Timing");

        if let Some(age) = cache_max_age {
            let dropped = engine.cache.remove_older_than(saturating_before(Utc::now(), age));
            debug!(dropped, "Expired cached issues");
        }

        if args.once {
            return Ok(());
        }
        let sleep = delay.saturating_sub(started.elapsed());
        info!(?sleep, "Sleeping until next iteration");
        thread::sleep(sleep);
    }
}

/// One selection plus summarization pass. Returns the stats and the next watermark.
///
/// # Errors
///
/// Transient failures abort the pass; permanent per-issue failures do not.
pub fn run_iteration(
    engine: &Engine,
    storage: &mut SqliteStorage,
    since: DateTime<Utc>,
    limit: usize,
    opts: SummarizeOptions,
    json: bool,
    timers: &Timers,
) -> Result<(IterationStats, DateTime<Utc>)> {
    let iteration_start = Utc::now();
    let started = Instant::now();

    let selection = {
        let _t = timers.start("select");
        select_for_iteration(engine, since, limit)?
    };
    let mut stats = IterationStats {
        selected: selection.keys.len(),
        errors: selection.skipped.len(),
        ..IterationStats::default()
    };

    for key in &selection.keys {
        let issue_started = Instant::now();
        let result = {
            let _t = timers.start("summarize");
            engine
                .cache
                .get(key)
                .and_then(|issue| SummaryBuilder::new(engine, &mut *storage).summarize(&issue, opts))
        };
        match result {
            Ok(text) => {
                stats.processed += 1;
                let elapsed = issue_started.elapsed();
                info!(%key, ?elapsed, "Summarized");
                if !json {
                    println!("Summarized {key} ({:.1}s):\n{text}\n", elapsed.as_secs_f64());
                }
            }
            Err(err) if err.is_transient() => return Err(err),
            Err(err) => {
                warn!(%key, error = %err, "Skipping issue");
                stats.errors += 1;
            }
        }
    }

    stats.with_cache(engine.cache.stats());
    stats.elapsed = started.elapsed();
    Ok((stats, next_watermark(&selection, limit, iteration_start)))
}
