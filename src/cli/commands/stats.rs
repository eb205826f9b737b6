//! Stats command implementation.

use crate::cli::commands::StoreContext;
use crate::config::CliOverrides;
use crate::error::Result;
use crate::storage::WATERMARK_KEY;
use serde_json::json;
use tracing::info;

/// Execute the stats command.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or queried.
pub fn execute(json: bool, cli: &CliOverrides) -> Result<()> {
    let StoreContext { storage, paths, .. } = StoreContext::open(cli)?;
    let stats = storage.stats()?;
    let watermark = storage.get_metadata(WATERMARK_KEY)?;
    info!(?stats, "Computed summary store statistics");

    if json {
        let output = json!({
            "db": paths.db_path,
            "total": stats.total,
            "fresh": stats.fresh,
            "stale": stats.stale,
            "pending": stats.pending,
            "watermark": watermark,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Summary store: {}", paths.db_path.display());
        println!("  Total:   {}", stats.total);
        println!("  Fresh:   {}", stats.fresh);
        println!("  Stale:   {}", stats.stale);
        println!("  Pending: {}", stats.pending);
        if let Some(watermark) = watermark {
            println!("  Polled through: {watermark}");
        }
    }
    Ok(())
}
