//! Rollup command implementation.

use chrono::Utc;

use crate::cli::RollupArgs;
use crate::cli::commands::CommandContext;
use crate::config::CliOverrides;
use crate::engine::{RollupOptions, collect_rollup};
use crate::error::Result;
use crate::model::IssueKey;

/// Execute the rollup command.
///
/// # Errors
///
/// Returns an error for an invalid key or any tracker, store or model failure.
pub fn execute(args: &RollupArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let key = IssueKey::parse(&args.key)?;
    let CommandContext {
        mut storage,
        engine,
        ..
    } = CommandContext::open(cli)?;

    let opts = RollupOptions {
        inactive_days: args.inactive_days.unwrap_or(engine.config.inactive_days),
        max_depth: engine.config.max_depth,
        exec: args.exec,
    };
    let report = collect_rollup(&engine, &mut storage, &key, opts, Utc::now())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_text(engine.config.wrap_column));
    }
    Ok(())
}
