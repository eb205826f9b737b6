//! Working-set selection for one polling iteration.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::error::{Result, SummaryError};
use crate::model::IssueKey;
use crate::source::IssueQuery;

/// Leave this much headroom below the query limit before trusting that a
/// window was fetched completely.
const LIMIT_HEADROOM: usize = 5;

/// Result of [`select_for_iteration`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    /// Keys to process, children before parents
    pub keys: Vec<IssueKey>,
    /// Latest `updated` among kept query hits, or the `since` passed in
    pub watermark: DateTime<Utc>,
    /// Number of query hits before filtering
    pub fetched: usize,
    /// Issues dropped for a permanent per-issue failure, with the reason
    pub skipped: Vec<(IssueKey, String)>,
}

/// Labeled issues changed since `since`, their eligible ancestors, ordered
/// bottom-up by hierarchy level.
///
/// The issue cache is cleared first so every decision sees fresh data.
///
/// # Errors
///
/// Transient failures abort the whole selection so the caller can retry the
/// same window. Permanent failures for one issue only skip that issue.
pub fn select_for_iteration(engine: &Engine, since: DateTime<Utc>, limit: usize) -> Result<Selection> {
    let cache = &engine.cache;
    let hits = cache
        .source()
        .query(&IssueQuery::labeled(&engine.config.label, since, limit))?;
    cache.clear();

    let mut watermark = since;
    let mut skipped = Vec::new();
    let mut kept = Vec::new();
    for hit in &hits {
        let issue = match cache.get(&hit.key) {
            Ok(issue) => issue,
            Err(err) if err.is_transient() => return Err(err),
            Err(err) => {
                warn!(key = %hit.key, error = %err, "Skipping issue");
                skipped.push((hit.key.clone(), err.to_string()));
                continue;
            }
        };
        if engine.is_eligible(&issue) {
            watermark = watermark.max(issue.updated);
            kept.push(issue);
        } else {
            debug!(key = %issue.key, project = %issue.project_key, "Project not allowed");
        }
    }
    info!(
        since = %since,
        fetched = hits.len(),
        kept = kept.len(),
        "Issues updated since watermark"
    );

    let mut seen: HashSet<IssueKey> = kept.iter().map(|i| i.key.clone()).collect();
    let mut selected = kept.clone();
    for issue in &kept {
        let parents = match issue.all_parents(cache) {
            Ok(parents) => parents,
            Err(err) if err.is_transient() => return Err(err),
            Err(err @ SummaryError::ParentCycle { .. }) => {
                warn!(key = %issue.key, error = %err, "Not propagating past parent cycle");
                skipped.push((issue.key.clone(), err.to_string()));
                continue;
            }
            Err(err) => {
                warn!(key = %issue.key, error = %err, "Cannot resolve parents");
                skipped.push((issue.key.clone(), err.to_string()));
                continue;
            }
        };
        for parent in parents {
            if seen.contains(&parent.key) {
                continue;
            }
            if !engine.is_eligible(&parent) {
                debug!(key = %issue.key, parent = %parent.key, "Ineligible ancestor stops propagation");
                break;
            }
            seen.insert(parent.key.clone());
            selected.push(parent);
        }
    }

    selected.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.key.cmp(&b.key)));
    let keys: Vec<IssueKey> = selected.iter().map(|i| i.key.clone()).collect();
    debug!(?keys, "Selected for this iteration");

    Ok(Selection {
        keys,
        watermark,
        fetched: hits.len(),
        skipped,
    })
}

/// Where the next iteration should start.
///
/// A query that came back comfortably under its limit saw the whole window,
/// so the next one may start at this iteration's start time. Otherwise more
/// hits may be waiting and only the latest timestamp actually seen is safe.
#[must_use]
pub fn next_watermark(
    selection: &Selection,
    limit: usize,
    iteration_start: DateTime<Utc>,
) -> DateTime<Utc> {
    if limit == 0 || selection.fetched < limit.saturating_sub(LIMIT_HEADROOM) {
        iteration_start
    } else {
        selection.watermark
    }
}
