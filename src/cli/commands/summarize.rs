//! Summarize command implementation.

use serde_json::json;
use std::time::Instant;
use tracing::info;

use crate::cli::SummarizeArgs;
use crate::cli::commands::CommandContext;
use crate::config::CliOverrides;
use crate::engine::{SummarizeOptions, SummaryBuilder};
use crate::error::Result;
use crate::model::IssueKey;

/// Execute the summarize command.
///
/// # Errors
///
/// Returns an error for an invalid key, an unknown issue, or any tracker,
/// model or store failure while building.
pub fn execute(args: &SummarizeArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let key = IssueKey::parse(&args.key)?;
    let CommandContext {
        mut storage,
        engine,
        ..
    } = CommandContext::open(cli)?;

    let opts = SummarizeOptions::new(args.max_depth.unwrap_or(engine.config.max_depth))
        .send_updates(!args.no_update)
        .regenerate(args.regenerate)
        .prompt_only(args.prompt_only);

    let started = Instant::now();
    let issue = engine.cache.get(&key)?;
    let mut builder = SummaryBuilder::new(&engine, &mut storage);
    let text = builder.summarize(&issue, opts)?;
    let llm_calls = builder.llm_calls();
    let posted: Vec<String> = builder.posted().iter().map(ToString::to_string).collect();
    let elapsed = started.elapsed();
    info!(%key, llm_calls, ?elapsed, "Summarize finished");

    if json {
        let output = json!({
            "key": key,
            "prompt_only": args.prompt_only,
            "text": text,
            "llm_calls": llm_calls,
            "posted": posted,
            "elapsed_secs": elapsed.as_secs_f64(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if args.prompt_only {
        println!("{text}");
    } else {
        println!("{}", engine.markers.wrap(&text, engine.config.wrap_column));
    }

    Ok(())
}
