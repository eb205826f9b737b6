//! Rollups: existing summaries and contributors collected across a subtree.
//!
//! A rollup reads more than it writes. Children of the root that have been
//! quiet for longer than the inactivity window (themselves and everything
//! below them) are left out; the rest contribute their summary, their
//! contributor sets and counts of their descendants by category.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt::Write as _;
use tracing::{debug, info};

use crate::engine::{Engine, get_or_update_summary};
use crate::error::Result;
use crate::model::{Issue, IssueKey, User};
use crate::storage::SqliteStorage;
use crate::util::fill;
use crate::util::time::days_before;

const CLOSED_STATUS: &str = "Closed";
const BACKLOG_STATUSES: [&str; 3] = ["Backlog", "New", "ToDo"];

/// Every transitive child of `key`, sorted, `key` itself excluded.
///
/// # Errors
///
/// Propagates tracker failures.
pub fn descendants(engine: &Engine, key: &IssueKey) -> Result<Vec<IssueKey>> {
    let mut seen = HashSet::from([key.clone()]);
    let mut queue = VecDeque::from([key.clone()]);
    let mut found = Vec::new();

    while let Some(next) = queue.pop_front() {
        let issue = engine.cache.get(&next)?;
        for child in issue.children(&engine.cache)? {
            if seen.insert(child.key.clone()) {
                found.push(child.key.clone());
                queue.push_back(child.key.clone());
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Updated within the last `inactive_days`, or (when `recursive`) has an
/// active descendant.
///
/// # Errors
///
/// Propagates tracker failures while walking children.
pub fn is_active(
    engine: &Engine,
    issue: &Issue,
    inactive_days: i64,
    recursive: bool,
    now: DateTime<Utc>,
) -> Result<bool> {
    let cutoff = days_before(now, inactive_days);
    if issue.updated >= cutoff {
        return Ok(true);
    }
    if !recursive {
        return Ok(false);
    }
    for key in descendants(engine, &issue.key)? {
        if engine.cache.get(&key)?.updated >= cutoff {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Contributors and assignees across `issue` and its descendants.
///
/// With `active_only`, only issues active within `inactive_days` count.
///
/// # Errors
///
/// Propagates tracker failures.
pub fn rollup_contributors(
    engine: &Engine,
    issue: &Issue,
    active_only: bool,
    inactive_days: i64,
    now: DateTime<Utc>,
) -> Result<BTreeSet<User>> {
    let mut users = BTreeSet::new();
    let mut add = |issue: &Issue| -> Result<()> {
        if active_only && !is_active(engine, issue, inactive_days, false, now)? {
            return Ok(());
        }
        users.extend(issue.contributors.iter().cloned());
        users.extend(issue.assignee.iter().cloned());
        Ok(())
    };

    add(issue)?;
    for key in descendants(engine, &issue.key)? {
        add(engine.cache.get(&key)?.as_ref())?;
    }
    Ok(users)
}

/// Issues bucketed by state. Buckets overlap: a closed issue is also active
/// or inactive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Categories {
    pub active: BTreeSet<IssueKey>,
    pub inactive: BTreeSet<IssueKey>,
    pub closed: BTreeSet<IssueKey>,
    pub backlog: BTreeSet<IssueKey>,
}

impl Categories {
    /// "3(Active), 1(Closed)" with empty buckets left out.
    #[must_use]
    pub fn counts_line(&self) -> String {
        [
            (self.active.len(), "Active"),
            (self.closed.len(), "Closed"),
            (self.backlog.len(), "Backlog"),
        ]
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, name)| format!("{n}({name})"))
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// Sort issues into active, inactive, closed and backlog buckets.
#[must_use]
pub fn categorize<'i, I>(issues: I, inactive_days: i64, now: DateTime<Utc>) -> Categories
where
    I: IntoIterator<Item = &'i Issue>,
{
    let cutoff = days_before(now, inactive_days);
    let mut cats = Categories::default();
    for issue in issues {
        let key = issue.key.clone();
        if issue.updated >= cutoff {
            cats.active.insert(key.clone());
        } else {
            cats.inactive.insert(key.clone());
        }
        if issue.status == CLOSED_STATUS {
            cats.closed.insert(key.clone());
        }
        if BACKLOG_STATUSES.contains(&issue.status.as_str()) {
            cats.backlog.insert(key);
        }
    }
    cats
}

/// One active child of the rollup root.
#[derive(Debug, Clone, Serialize)]
pub struct RollupItem {
    pub key: IssueKey,
    /// One-line identity, e.g. "ABC-1: Title (Open/Unresolved)"
    pub headline: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exec_summary: Option<String>,
    pub contributors: BTreeSet<User>,
    pub active_contributors: BTreeSet<User>,
    pub descendants: Categories,
    pub descendant_total: usize,
}

/// Rollup of one root issue.
#[derive(Debug, Clone, Serialize)]
pub struct RollupReport {
    pub root: IssueKey,
    pub title: String,
    pub generated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exec_summary: Option<String>,
    pub contributors: BTreeSet<User>,
    pub active_contributors: BTreeSet<User>,
    pub items: Vec<RollupItem>,
}

/// Names deduplicated by display name and sorted by last name.
fn contributor_line(header: &str, users: &BTreeSet<User>) -> String {
    let mut names: Vec<&str> = users
        .iter()
        .map(|u| u.display_name.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    names.sort_by_key(|n| n.split_whitespace().last().unwrap_or(n).to_string());
    format!("{header} ({}): {}", names.len(), names.join(", "))
}

impl RollupReport {
    /// Plain text rendering.
    #[must_use]
    pub fn render_text(&self, width: usize) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Executive Summary: {}", self.title);
        if let Some(exec) = &self.exec_summary {
            let _ = writeln!(out, "{}", fill(exec, width, ""));
        }
        if !self.active_contributors.is_empty() {
            let _ = writeln!(out, "{}", contributor_line("Active contributors", &self.active_contributors));
        }
        if !self.contributors.is_empty() {
            let _ = writeln!(out, "{}", contributor_line("All contributors", &self.contributors));
        }

        let _ = writeln!(out, "\nStatus of individual issues");
        for item in &self.items {
            let _ = writeln!(out, "\n== {} ==", item.headline);
            let text = item.exec_summary.as_deref().unwrap_or(&item.summary);
            let _ = writeln!(out, "{}", fill(text, width, ""));
            if !item.active_contributors.is_empty() {
                let _ = writeln!(out, "{}", contributor_line("Active contributors", &item.active_contributors));
            }
            if !item.contributors.is_empty() {
                let _ = writeln!(out, "{}", contributor_line("All contributors", &item.contributors));
            }
            let _ = writeln!(
                out,
                "Sub-issues: {} - Total {}",
                item.descendants.counts_line(),
                item.descendant_total
            );
        }
        out
    }
}

/// Knobs for [`collect_rollup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupOptions {
    pub inactive_days: i64,
    /// Depth budget when a child's summary must be built
    pub max_depth: usize,
    /// Condense each item and the whole rollup for leadership through the model
    pub exec: bool,
}

/// Collect the rollup for `root_key`.
///
/// # Errors
///
/// Propagates tracker, store and model failures.
pub fn collect_rollup(
    engine: &Engine,
    store: &mut SqliteStorage,
    root_key: &IssueKey,
    opts: RollupOptions,
    now: DateTime<Utc>,
) -> Result<RollupReport> {
    info!(root = %root_key, "Collecting issue summaries for children");
    let root = engine.cache.get(root_key)?;

    let mut items = Vec::new();
    for child in root.children(&engine.cache)? {
        let issue = engine.cache.get(&child.key)?;
        if !is_active(engine, &issue, opts.inactive_days, true, now)? {
            debug!(key = %issue.key, "Skipping inactive issue");
            continue;
        }

        let summary = get_or_update_summary(engine, store, &issue, opts.max_depth)?;
        let desc_keys = descendants(engine, &issue.key)?;
        let desc_issues = desc_keys
            .iter()
            .map(|k| engine.cache.get(k))
            .collect::<Result<Vec<_>>>()?;

        items.push(RollupItem {
            key: issue.key.clone(),
            headline: issue.to_string(),
            summary,
            exec_summary: None,
            contributors: rollup_contributors(engine, &issue, false, opts.inactive_days, now)?,
            active_contributors: rollup_contributors(engine, &issue, true, opts.inactive_days, now)?,
            descendants: categorize(desc_issues.iter().map(|i| &**i), opts.inactive_days, now),
            descendant_total: desc_keys.len(),
        });
    }
    items.sort_by(|a, b| a.key.cmp(&b.key));

    let mut exec_summary = None;
    if opts.exec {
        for item in &mut items {
            info!(key = %item.key, "Generating an executive summary");
            let prompt = format!(
                "Condense the following technical status update into a short, high-level summary for an engineering leader.\n\
                 Focus on the high-level objective, keeping the technical detail to a minimum.\n\
                 Where possible, avoid mentioning specific issue IDs.\n\n{}\n{}\n\n\
                 Please provide just the summary paragraph, with no header.\n",
                item.headline, item.summary
            );
            item.exec_summary = Some(engine.summarizer.complete(&prompt)?.trim().to_string());
        }

        let paragraphs = items
            .iter()
            .filter_map(|i| i.exec_summary.as_deref())
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Given the following high-level summaries of our group's work, please provide a short, \
             one-paragraph summary of this initiative for a corporate leader:\n\n{paragraphs}\n\n\
             Please provide just the summary paragraph, with no header.\n"
        );
        exec_summary = Some(engine.summarizer.complete(&prompt)?.trim().to_string());
    }

    Ok(RollupReport {
        root: root.key.clone(),
        title: format!("{} - {}", root.key, root.summary),
        generated: now,
        exec_summary,
        contributors: rollup_contributors(engine, &root, false, opts.inactive_days, now)?,
        active_contributors: rollup_contributors(engine, &root, true, opts.inactive_days, now)?,
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> User {
        User {
            name: name.to_lowercase().replace(' ', "."),
            display_name: name.to_string(),
        }
    }

    #[test]
    fn test_counts_line_skips_empty_buckets() {
        let key = IssueKey::parse("A-1").unwrap();
        let cats = Categories {
            active: BTreeSet::from([key.clone()]),
            backlog: BTreeSet::from([key]),
            ..Categories::default()
        };
        assert_eq!(cats.counts_line(), "1(Active), 1(Backlog)");
    }

    #[test]
    fn test_contributor_line_sorts_by_last_name() {
        let users = BTreeSet::from([user("Zed Adams"), user("Amy Young"), user("Bo Mills")]);
        assert_eq!(
            contributor_line("All contributors", &users),
            "All contributors (3): Zed Adams, Bo Mills, Amy Young"
        );
    }
}
