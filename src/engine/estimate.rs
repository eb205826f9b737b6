//! Prompt size estimates.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::engine::{Engine, SummarizeOptions, SummaryBuilder};
use crate::error::{Result, SummaryError};
use crate::model::{Issue, IssueKey};
use crate::storage::SqliteStorage;

/// Token estimate for summarizing one issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueEstimate {
    pub key: IssueKey,
    pub issue_type: String,
    pub updated: DateTime<Utc>,
    pub child_count: usize,
    pub comment_count: usize,
    /// `None` when the prompt is too large to count
    pub tokens: Option<usize>,
}

impl IssueEstimate {
    pub const CSV_HEADER: &'static str = "key,issue_type,updated,child_count,comment_count,tokens";

    /// CSV row; an uncountable prompt shows as -1.
    #[must_use]
    pub fn as_csv(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.key,
            self.issue_type,
            self.updated.to_rfc3339(),
            self.child_count,
            self.comment_count,
            self.tokens.map_or_else(|| "-1".to_string(), |t| t.to_string())
        )
    }
}

impl fmt::Display for IssueEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tokens {
            Some(tokens) => write!(f, "{} ({}): {tokens} tokens", self.key, self.issue_type),
            None => write!(f, "{} ({}): too large to count", self.key, self.issue_type),
        }
    }
}

/// Build `issue`'s prompt without calling the model and count its tokens.
///
/// Children contribute whatever summary they already have.
///
/// # Errors
///
/// Propagates tracker and store failures. A prompt too large to count is not
/// an error; it yields `tokens: None`.
pub fn estimate_issue(
    engine: &Engine,
    store: &mut SqliteStorage,
    issue: &Issue,
) -> Result<IssueEstimate> {
    let opts = SummarizeOptions::new(0).regenerate(true).prompt_only(true);
    let prompt = SummaryBuilder::new(engine, store).summarize(issue, opts)?;

    let tokens = match engine.summarizer.count_tokens(&prompt) {
        Ok(tokens) => Some(tokens),
        Err(SummaryError::PromptTooLarge { tokens, limit }) => {
            debug!(key = %issue.key, tokens, limit, "Prompt too large to count");
            None
        }
        Err(err) => return Err(err),
    };

    Ok(IssueEstimate {
        key: issue.key.clone(),
        issue_type: issue.issue_type.clone(),
        updated: issue.updated,
        child_count: issue.children(&engine.cache)?.len(),
        comment_count: issue.comments(&engine.cache)?.len(),
        tokens,
    })
}
