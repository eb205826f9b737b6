//! Shared utilities for `aisummary`.
//!
//! Common functionality used across modules:
//! - Time parsing and storage formatting (RFC3339)
//! - Word wrapping and summary marker blocks
//! - Retry with exponential backoff
//! - Timing statistics

pub mod retry;
pub mod text;
pub mod time;
pub mod timer;

pub use retry::{RetryPolicy, with_retry};
pub use text::{SummaryMarkers, fill};
pub use timer::{IterationStats, Timers};
