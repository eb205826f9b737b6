//! Persistent summary store.
//!
//! One `SQLite` file holds generated summaries with their staleness markers,
//! the database config layer, and bookkeeping metadata such as the polling
//! watermark.

pub mod schema;
mod sqlite;

pub use sqlite::{MarkOutcome, MutationContext, SqliteStorage, StoreStats, SummaryRecord};

/// Metadata key for the polling watermark.
pub const WATERMARK_KEY: &str = "poll.watermark";
/// Metadata key for the invalidation watermark.
pub const INVALIDATE_WATERMARK_KEY: &str = "invalidate.watermark";
