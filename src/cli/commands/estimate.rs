//! Estimate command implementation.

use tracing::{info, warn};

use crate::cli::EstimateArgs;
use crate::cli::commands::CommandContext;
use crate::config::CliOverrides;
use crate::engine::{IssueEstimate, estimate_issue};
use crate::error::Result;
use crate::source::IssueQuery;
use crate::util::time::parse_flexible_timestamp;

/// Execute the estimate command for every issue updated since `--since`.
///
/// # Errors
///
/// Returns an error for a bad `--since`, or a transient tracker failure.
pub fn execute(args: &EstimateArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let since = parse_flexible_timestamp(args.since.as_deref().unwrap_or("-1d"), "since")?;
    let CommandContext {
        mut storage,
        engine,
        ..
    } = CommandContext::open(cli)?;

    let query = IssueQuery {
        updated_since: Some(since),
        ..IssueQuery::default()
    };
    let hits = engine.cache.source().query(&query)?;
    info!(count = hits.len(), %since, "Estimating issues");

    let mut estimates = Vec::with_capacity(hits.len());
    for hit in &hits {
        let result = engine
            .cache
            .get(&hit.key)
            .and_then(|issue| estimate_issue(&engine, &mut storage, &issue));
        match result {
            Ok(estimate) => estimates.push(estimate),
            Err(err) if err.is_transient() => return Err(err),
            Err(err) => warn!(key = %hit.key, error = %err, "Cannot estimate issue"),
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&estimates)?);
    } else if args.csv {
        println!("{}", IssueEstimate::CSV_HEADER);
        for estimate in &estimates {
            println!("{}", estimate.as_csv());
        }
    } else {
        for estimate in &estimates {
            println!("{estimate}");
        }
    }
    Ok(())
}
