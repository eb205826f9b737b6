//! The issue tracker collaborator.
//!
//! Everything the engine knows about issues comes through [`IssueSource`].
//! Implementations classify their failures as transient or permanent via
//! [`SummaryError::Upstream`](crate::error::SummaryError::Upstream); the
//! [`RetryingSource`] decorator retries the transient ones.

mod retrying;
mod snapshot;

pub use retrying::RetryingSource;
pub use snapshot::{SnapshotLink, SnapshotRecord, SnapshotSource};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::Result;
use crate::model::{ChangeEntry, Comment, IssueKey, User};

/// Issue fields as delivered by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIssue {
    pub key: IssueKey,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    pub issue_type: String,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub status_summary: String,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<User>,
    #[serde(default)]
    pub contributors: BTreeSet<User>,
    /// Structural parent (sub-task to its parent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<IssueKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_link: Option<IssueKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic_link: Option<IssueKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_link: Option<IssueKey>,
}

/// A relationship edge as delivered by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLink {
    pub key: IssueKey,
    pub how: String,
}

/// Filter for [`IssueSource::query`]. Results are ascending by `updated`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueQuery {
    pub label: Option<String>,
    /// Inclusive lower bound on `updated`
    pub updated_since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `updated`
    pub updated_before: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl IssueQuery {
    #[must_use]
    pub fn labeled(label: impl Into<String>, since: DateTime<Utc>, limit: usize) -> Self {
        Self {
            label: Some(label.into()),
            updated_since: Some(since),
            updated_before: None,
            limit,
        }
    }

    #[must_use]
    pub fn matches(&self, issue: &RawIssue) -> bool {
        self.label.as_ref().is_none_or(|l| issue.labels.contains(l))
            && self.updated_since.is_none_or(|s| issue.updated >= s)
            && self.updated_before.is_none_or(|b| issue.updated < b)
    }
}

/// Key plus last-modified time, the shape of a query hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueHeader {
    pub key: IssueKey,
    pub updated: DateTime<Utc>,
}

/// A write to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    /// Replace the dedicated AI summary field
    StatusSummary(String),
    /// Replace the label set
    Labels(BTreeSet<String>),
}

impl FieldUpdate {
    /// Tracker field name the update writes.
    #[must_use]
    pub fn field_name<'a>(&self, summary_field: &'a str) -> &'a str {
        match self {
            Self::StatusSummary(_) => summary_field,
            Self::Labels(_) => "labels",
        }
    }
}

/// Who the tracker thinks we are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub display_name: String,
    pub timezone: String,
}

/// Read and write access to the issue tracker.
pub trait IssueSource: Send + Sync {
    /// Fetch the issue's own fields.
    ///
    /// # Errors
    ///
    /// `IssueNotFound` for unknown keys, `Upstream` for tracker failures.
    fn fetch(&self, key: &IssueKey) -> Result<RawIssue>;

    /// Changelog, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates tracker failures.
    fn fetch_changelog(&self, key: &IssueKey) -> Result<Vec<ChangeEntry>>;

    /// Comments, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates tracker failures.
    fn fetch_comments(&self, key: &IssueKey) -> Result<Vec<Comment>>;

    /// Every related issue: links, sub-tasks, upward and downward hierarchy edges.
    ///
    /// # Errors
    ///
    /// Propagates tracker failures.
    fn fetch_related(&self, key: &IssueKey) -> Result<Vec<RawLink>>;

    /// # Errors
    ///
    /// Propagates tracker failures.
    fn query(&self, query: &IssueQuery) -> Result<Vec<IssueHeader>>;

    /// # Errors
    ///
    /// Propagates tracker failures.
    fn update_field(&self, key: &IssueKey, update: &FieldUpdate) -> Result<()>;

    /// # Errors
    ///
    /// Propagates tracker failures.
    fn whoami(&self) -> Result<Identity>;
}
