//! Core data types for `aisummary`.
//!
//! This module defines the fundamental types used throughout the application:
//! - `IssueKey` - `PREFIX-NUMBER` identifiers with numeric-aware ordering
//! - `Issue` - a fetched tracker issue with lazily loaded sub-resources
//! - `User`, `ChangeEntry`, `Comment` - issue history
//! - `RelatedIssue` - a relationship edge to another issue
//! - `LevelTable` - issue type to hierarchy rank

mod issue;

pub use issue::Issue;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::SummaryError;

static KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z][A-Z0-9_]*)-(\d+)$").expect("valid key regex"));

/// Tracker issue key such as `ABC-123`.
///
/// Ordering compares the project prefix first, then the number numerically,
/// so `ABC-2 < ABC-10` and `ABC-1 < ABD-1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IssueKey {
    prefix: String,
    number: u64,
}

impl IssueKey {
    /// Parse a key. Lowercase input is accepted and normalized.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the input is not of the form `PREFIX-NUMBER`.
    pub fn parse(input: &str) -> Result<Self, SummaryError> {
        let normalized = input.trim().to_uppercase();
        let invalid = || SummaryError::InvalidKey {
            key: input.to_string(),
        };
        let caps = KEY_PATTERN.captures(&normalized).ok_or_else(invalid)?;
        let number = caps[2].parse::<u64>().map_err(|_| invalid())?;
        Ok(Self {
            prefix: caps[1].to_string(),
            number,
        })
    }

    /// Project part of the key (`ABC` for `ABC-123`).
    #[must_use]
    pub fn project(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub const fn number(&self) -> u64 {
        self.number
    }
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.prefix, self.number)
    }
}

impl FromStr for IssueKey {
    type Err = SummaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for IssueKey {
    type Error = SummaryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<IssueKey> for String {
    fn from(key: IssueKey) -> Self {
        key.to_string()
    }
}

/// A tracker account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct User {
    /// Login name
    pub name: String,
    /// Name shown in the UI and recorded as changelog author
    pub display_name: String,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}

/// One field change inside a changelog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeItem {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

/// A timestamped set of field changes made by one author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// Display name of the author
    pub author: String,
    pub created: DateTime<Utc>,
    pub items: Vec<ChangeItem>,
}

impl ChangeEntry {
    #[must_use]
    pub fn touches(&self, field: &str) -> bool {
        self.items.iter().any(|item| item.field == field)
    }
}

/// A comment on an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub created: DateTime<Utc>,
    pub body: String,
}

/// Relation label for a sub-task as seen from its parent.
pub const HOW_SUBTASK: &str = "has a sub-task";
/// Relation label for an issue in an epic as seen from the epic.
pub const HOW_IN_EPIC: &str = "is the Epic issue for";
/// Relation label for an issue under a parent link as seen from the parent.
pub const HOW_IN_PARENT: &str = "is the parent issue of";

/// An edge from one issue to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedIssue {
    pub key: IssueKey,
    /// Human readable relation label, e.g. "blocks" or "Epic Link"
    pub how: String,
    pub is_child: bool,
}

impl RelatedIssue {
    #[must_use]
    pub fn new(key: IssueKey, how: impl Into<String>) -> Self {
        let how = how.into();
        let is_child = matches!(how.as_str(), HOW_SUBTASK | HOW_IN_EPIC | HOW_IN_PARENT);
        Self { key, how, is_child }
    }

    /// Relation label as it reads in a prompt. Upward custom-field links are
    /// stored under the field name and need rephrasing.
    #[must_use]
    pub fn describe(&self) -> &str {
        match self.how.as_str() {
            "Parent Link" => "is a child of the parent issue",
            "Epic Link" => "is a child of the Epic issue",
            "Feature Link" => "is a child of the Feature issue",
            other => other,
        }
    }
}

/// Issue type to hierarchy rank. Leaves rank lowest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTable(BTreeMap<String, u32>);

impl Default for LevelTable {
    fn default() -> Self {
        let table = [
            ("Sub-task", 1),
            ("Bug", 2),
            ("Story", 2),
            ("Task", 2),
            ("Spike", 2),
            ("Vulnerability", 2),
            ("Weakness", 2),
            ("Enhancement", 2),
            ("Epic", 3),
            ("Feature", 4),
            ("Initiative", 5),
            ("Outcome", 6),
        ];
        Self(
            table
                .into_iter()
                .map(|(name, level)| (name.to_string(), level))
                .collect(),
        )
    }
}

impl LevelTable {
    /// Rank for an issue type, `None` when the type is unknown.
    #[must_use]
    pub fn level_of(&self, issue_type: &str) -> Option<u32> {
        self.0.get(issue_type).copied()
    }

    pub fn set(&mut self, issue_type: impl Into<String>, level: u32) {
        self.0.insert(issue_type.into(), level);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(name, level)| (name.as_str(), *level))
    }
}
