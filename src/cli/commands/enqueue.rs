//! Enqueue command implementation.

use serde_json::json;
use tracing::info;

use crate::cli::EnqueueArgs;
use crate::cli::commands::StoreContext;
use crate::config::CliOverrides;
use crate::error::Result;
use crate::model::IssueKey;
use crate::storage::MarkOutcome;

/// Execute the enqueue command: mark each key stale, creating placeholders.
///
/// # Errors
///
/// Returns an error for an invalid key (before anything is written) or a
/// store failure.
pub fn execute(args: &EnqueueArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let keys = args
        .keys
        .iter()
        .map(|k| IssueKey::parse(k))
        .collect::<Result<Vec<_>>>()?;
    let StoreContext { mut storage, .. } = StoreContext::open(cli)?;

    let mut results = Vec::new();
    for key in keys {
        let outcome = storage.mark_stale(&key, true)?;
        info!(%key, ?outcome, "Enqueued");
        results.push((key, outcome));
    }

    if json {
        let output: Vec<_> = results
            .iter()
            .map(|(key, outcome)| json!({ "key": key, "outcome": outcome }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for (key, outcome) in &results {
            match outcome {
                MarkOutcome::Marked => println!("Queued {key}"),
                MarkOutcome::AlreadyStale => println!("{key} is already queued"),
                MarkOutcome::NotFound => println!("{key} not found"),
            }
        }
    }
    Ok(())
}
