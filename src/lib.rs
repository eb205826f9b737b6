//! `aisummary` - AI status summaries for tracker issues.
//!
//! The crate polls an issue tracker for issues carrying the opt-in label,
//! builds a prompt from each issue's description, comments and related
//! issues, asks a language model for a short status summary, and writes the
//! result back to the tracker and to a local summary store. Summaries are
//! rebuilt bottom-up through the parent/child hierarchy so a parent always
//! sees fresh child summaries.
//!
//! Layout:
//! - [`cache`] - bounded LRU cache of fetched issue snapshots
//! - [`model`] - issue keys, issues and their relationship edges
//! - [`source`] - the tracker collaborator (`IssueSource`) and implementations
//! - [`llm`] - the language model collaborator (`Summarizer`)
//! - [`storage`] - `SQLite` summary store with staleness propagation
//! - [`engine`] - currency checks, recursive builder, selection, rollup
//! - [`config`] - layered configuration
//! - [`cli`] - the `aisum` command line

pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod logging;
pub mod model;
pub mod source;
pub mod storage;
pub mod util;

pub use error::{ErrorClass, ErrorCode, Result, StructuredError, SummaryError};
