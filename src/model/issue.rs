use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::cache::IssueCache;
use crate::error::{Result, SummaryError};
use crate::model::{ChangeEntry, Comment, IssueKey, LevelTable, RelatedIssue, User};
use crate::source::{FieldUpdate, RawIssue};

/// A tracker issue.
///
/// Fields come from one fetch. Changelog, comments and related edges are
/// loaded on first access and kept for the life of this snapshot; the cache
/// drops the whole snapshot after a write so the next read is authoritative.
#[derive(Debug, Serialize)]
pub struct Issue {
    pub key: IssueKey,
    pub summary: String,
    pub description: String,
    pub status: String,
    pub resolution: String,
    pub issue_type: String,
    pub project_key: String,
    pub labels: BTreeSet<String>,
    pub updated: DateTime<Utc>,
    /// Dedicated field holding the AI summary, markers included
    pub status_summary: String,
    pub blocked: bool,
    pub blocked_reason: String,
    pub contributors: BTreeSet<User>,
    pub assignee: Option<User>,
    /// Structural parent, else parent link, else epic link
    pub parent_key: Option<IssueKey>,
    pub level: u32,
    #[serde(skip)]
    changelog: OnceLock<Vec<ChangeEntry>>,
    #[serde(skip)]
    comments: OnceLock<Vec<Comment>>,
    #[serde(skip)]
    related: OnceLock<Vec<RelatedIssue>>,
}

impl Issue {
    /// Build an issue from tracker fields.
    ///
    /// Unknown issue types rank 0 and are logged, never rejected.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` when a required field is empty.
    pub fn from_raw(raw: RawIssue, levels: &LevelTable) -> Result<Self> {
        for (field, value) in [
            ("summary", &raw.summary),
            ("status", &raw.status),
            ("issue_type", &raw.issue_type),
        ] {
            if value.trim().is_empty() {
                return Err(SummaryError::malformed(
                    raw.key.to_string(),
                    format!("missing {field}"),
                ));
            }
        }

        let level = levels.level_of(&raw.issue_type).unwrap_or_else(|| {
            warn!(key = %raw.key, issue_type = %raw.issue_type, "Unknown issue type, ranking as 0");
            0
        });
        let parent_key = raw.parent.or(raw.parent_link).or(raw.epic_link);
        let project_key = raw.key.project().to_string();

        Ok(Self {
            key: raw.key,
            summary: raw.summary,
            description: raw.description,
            status: raw.status,
            resolution: raw.resolution.unwrap_or_else(|| "Unresolved".to_string()),
            issue_type: raw.issue_type,
            project_key,
            labels: raw.labels,
            updated: raw.updated,
            status_summary: raw.status_summary,
            blocked: raw.blocked,
            blocked_reason: raw.blocked_reason.unwrap_or_default(),
            contributors: raw.contributors,
            assignee: raw.assignee,
            parent_key,
            level,
            changelog: OnceLock::new(),
            comments: OnceLock::new(),
            related: OnceLock::new(),
        })
    }

    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Changelog, oldest first. Fetched once per snapshot.
    ///
    /// # Errors
    ///
    /// Propagates tracker failures.
    pub fn changelog(&self, cache: &IssueCache) -> Result<&[ChangeEntry]> {
        if let Some(entries) = self.changelog.get() {
            return Ok(entries);
        }
        debug!(key = %self.key, "Fetching changelog");
        let fetched = cache.source().fetch_changelog(&self.key)?;
        Ok(self.changelog.get_or_init(|| fetched))
    }

    /// Comments, oldest first. Fetched once per snapshot.
    ///
    /// # Errors
    ///
    /// Propagates tracker failures.
    pub fn comments(&self, cache: &IssueCache) -> Result<&[Comment]> {
        if let Some(comments) = self.comments.get() {
            return Ok(comments);
        }
        debug!(key = %self.key, "Fetching comments");
        let fetched = cache.source().fetch_comments(&self.key)?;
        Ok(self.comments.get_or_init(|| fetched))
    }

    /// All related issues. Fetched once per snapshot.
    ///
    /// # Errors
    ///
    /// Propagates tracker failures.
    pub fn related(&self, cache: &IssueCache) -> Result<&[RelatedIssue]> {
        if let Some(related) = self.related.get() {
            return Ok(related);
        }
        debug!(key = %self.key, "Fetching related issues");
        let fetched = cache
            .source()
            .fetch_related(&self.key)?
            .into_iter()
            .map(|link| RelatedIssue::new(link.key, link.how))
            .collect();
        Ok(self.related.get_or_init(|| fetched))
    }

    /// Related issues that are children of this one.
    ///
    /// # Errors
    ///
    /// Propagates tracker failures.
    pub fn children(&self, cache: &IssueCache) -> Result<Vec<&RelatedIssue>> {
        Ok(self.related(cache)?.iter().filter(|r| r.is_child).collect())
    }

    /// Ancestors, nearest first, resolved through the cache.
    ///
    /// # Errors
    ///
    /// Returns `ParentCycle` if the chain comes back to an issue already seen,
    /// and propagates fetch failures.
    pub fn all_parents(&self, cache: &IssueCache) -> Result<Vec<Arc<Self>>> {
        let mut chain: Vec<Arc<Self>> = Vec::new();
        let mut seen = HashSet::from([self.key.clone()]);
        let mut next = self.parent_key.clone();

        while let Some(key) = next {
            if !seen.insert(key.clone()) {
                let path = std::iter::once(self.key.to_string())
                    .chain(chain.iter().map(|p| p.key.to_string()))
                    .chain(std::iter::once(key.to_string()))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(SummaryError::ParentCycle {
                    key: self.key.to_string(),
                    chain: path,
                });
            }
            let parent = cache.get(&key)?;
            next = parent.parent_key.clone();
            chain.push(parent);
        }

        Ok(chain)
    }

    /// Write the AI summary field on the tracker, then drop this key from the cache.
    ///
    /// # Errors
    ///
    /// Propagates tracker failures; the cache entry is left alone on failure.
    pub fn update_status_summary(&self, cache: &IssueCache, text: &str) -> Result<()> {
        info!(key = %self.key, "Sending updated status summary to tracker");
        cache
            .source()
            .update_field(&self.key, &FieldUpdate::StatusSummary(text.to_string()))?;
        cache.remove(&self.key);
        Ok(())
    }

    /// Replace the label set on the tracker, then drop this key from the cache.
    ///
    /// # Errors
    ///
    /// Propagates tracker failures.
    pub fn update_labels(&self, cache: &IssueCache, labels: BTreeSet<String>) -> Result<()> {
        info!(key = %self.key, ?labels, "Sending updated labels to tracker");
        cache
            .source()
            .update_field(&self.key, &FieldUpdate::Labels(labels))?;
        cache.remove(&self.key);
        Ok(())
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({}/{})",
            self.key, self.summary, self.status, self.resolution
        )
    }
}
