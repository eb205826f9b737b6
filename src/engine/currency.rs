//! Is an issue's posted summary still current?
//!
//! A summary is current when neither the issue nor any direct child has
//! changed since our last write to the summary field. "Our" writes are
//! changelog entries authored by the configured identity or one of its
//! legacy aliases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, trace};

use crate::engine::Engine;
use crate::error::{Result, SummaryError};
use crate::model::{Issue, IssueKey};
use crate::util::time::epoch_floor;

/// How to treat an issue that does not carry the opt-in label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnlabeledPolicy {
    /// Never current: rebuilt whenever recursion reaches it, never posted.
    Regenerate,
    /// Always current: whatever summary text it carries is reused as is.
    AlwaysCurrent,
}

/// Unlabeled issues are rebuilt when a labeled ancestor needs them.
pub const DEFAULT_UNLABELED_POLICY: UnlabeledPolicy = UnlabeledPolicy::Regenerate;

impl UnlabeledPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regenerate => "regenerate",
            Self::AlwaysCurrent => "always-current",
        }
    }
}

impl fmt::Display for UnlabeledPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnlabeledPolicy {
    type Err = SummaryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "regenerate" | "never-current" => Ok(Self::Regenerate),
            "always-current" | "current" => Ok(Self::AlwaysCurrent),
            other => Err(SummaryError::Config(format!(
                "unlabeled-policy: expected regenerate or always-current, got {other:?}"
            ))),
        }
    }
}

/// Time of our most recent write to the summary field, or the epoch floor.
///
/// # Errors
///
/// Propagates changelog fetch failures.
pub fn last_summary_update(engine: &Engine, issue: &Issue) -> Result<DateTime<Utc>> {
    let field = &engine.config.summary_field;
    let last = issue
        .changelog(&engine.cache)?
        .iter()
        .filter(|entry| engine.is_own_author(&entry.author) && entry.touches(field))
        .map(|entry| entry.created)
        .max()
        .unwrap_or_else(epoch_floor);
    trace!(key = %issue.key, %last, "Last summary update");
    Ok(last)
}

/// Currency decisions memoized for one traversal.
///
/// Build one per top-level call; a fresh traversal must not reuse answers
/// because our own writes change them.
#[derive(Debug)]
pub struct CurrencyCheck<'a> {
    engine: &'a Engine,
    memo: HashMap<IssueKey, bool>,
}

impl<'a> CurrencyCheck<'a> {
    #[must_use]
    pub fn new(engine: &'a Engine) -> Self {
        Self {
            engine,
            memo: HashMap::new(),
        }
    }

    /// Whether `issue`'s summary reflects its own and its children's latest changes.
    ///
    /// # Errors
    ///
    /// Propagates tracker failures for the issue or its children.
    pub fn is_current(&mut self, issue: &Issue) -> Result<bool> {
        if let Some(&current) = self.memo.get(&issue.key) {
            return Ok(current);
        }
        let current = self.evaluate(issue)?;
        self.memo.insert(issue.key.clone(), current);
        Ok(current)
    }

    /// Forget the answer for `key`, e.g. after writing its summary.
    pub fn forget(&mut self, key: &IssueKey) {
        self.memo.remove(key);
    }

    fn evaluate(&self, issue: &Issue) -> Result<bool> {
        let engine = self.engine;
        if !issue.has_label(&engine.config.label) {
            let current = engine.config.unlabeled_policy == UnlabeledPolicy::AlwaysCurrent;
            trace!(key = %issue.key, current, "Unlabeled issue");
            return Ok(current);
        }

        let last = last_summary_update(engine, issue)?;
        if issue.updated > last {
            debug!(key = %issue.key, updated = %issue.updated, %last, "Summary is out of date");
            return Ok(false);
        }

        for child in issue.children(&engine.cache)? {
            let child_issue = engine.cache.get(&child.key)?;
            if child_issue.updated > last {
                debug!(
                    key = %issue.key,
                    child = %child.key,
                    child_updated = %child_issue.updated,
                    %last,
                    "Child changed since last summary"
                );
                return Ok(false);
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parse() {
        assert_eq!(
            "always_current".parse::<UnlabeledPolicy>().unwrap(),
            UnlabeledPolicy::AlwaysCurrent
        );
        assert_eq!(
            "Regenerate".parse::<UnlabeledPolicy>().unwrap(),
            UnlabeledPolicy::Regenerate
        );
        assert!("sometimes".parse::<UnlabeledPolicy>().is_err());
    }

    #[test]
    fn test_policy_display_round_trips() {
        for policy in [UnlabeledPolicy::Regenerate, UnlabeledPolicy::AlwaysCurrent] {
            assert_eq!(policy.to_string().parse::<UnlabeledPolicy>().unwrap(), policy);
        }
    }
}
