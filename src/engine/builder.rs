//! Recursive summary builder.
//!
//! A summary is built from the issue's own text, its comment log and its
//! related issues. Children within the depth budget are summarized first and
//! their summaries nested into the parent's prompt.
//!
//! ## Depth budget
//!
//! Each recursion into an ineligible child spends one level of the budget.
//! A child that is eligible for its own posted summary starts over at depth 0.
//! The current path is tracked so that a child cycle cannot recurse forever,
//! and every finished summary is memoized so one top-level call asks the model
//! at most once per issue.

use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::engine::{CurrencyCheck, Engine};
use crate::error::Result;
use crate::model::{Issue, IssueKey};
use crate::storage::SqliteStorage;
use crate::util::fill;

const IMPLEMENTER_PREAMBLE: &str = "\
You are a helpful assistant who is an expert in software development.
* Summarize the status of the following issue in a few sentences.
* Include an overview of any significant discussions or decisions, with their reasoning and outcome.
* Highlight any recent updates or changes that affect the completion of the issue.
* Use only the information below to create your summary.";

const PRODUCT_MANAGER_PREAMBLE: &str = "\
You are a helpful assistant who is an expert in software development and product management.
* Summarize the status of the following feature work for a product manager in a few sentences.
* Focus on progress across the child issues, open risks and blockers, and what remains to be done.
* Mention significant decisions and their outcome, keeping implementation detail to a minimum.
* Use only the information below to create your summary.";

const EXECUTIVE_PREAMBLE: &str = "\
You are a helpful assistant who writes status reports for engineering leadership.
* Summarize the overall status of the following initiative in a few sentences.
* Focus on the high-level objective, progress toward it and any risks to delivery.
* Avoid technical detail and individual issue numbers where possible.
* Use only the information below to create your summary.";

/// Role preamble for an issue at `level` in the hierarchy.
#[must_use]
pub fn preamble_for_level(level: u32) -> &'static str {
    match level {
        0..=2 => IMPLEMENTER_PREAMBLE,
        3 => PRODUCT_MANAGER_PREAMBLE,
        _ => EXECUTIVE_PREAMBLE,
    }
}

/// Full prompt for a rendered issue block.
#[must_use]
pub fn build_prompt(level: u32, block: &str) -> String {
    format!(
        "{}\n\n```\n{}\n```\n\nHere is a short summary in less than 100 words:\n",
        preamble_for_level(level),
        block.trim_end()
    )
}

/// Knobs for one top-level `summarize` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummarizeOptions {
    /// Levels of ineligible children to recurse into
    pub max_depth: usize,
    /// Post summaries of eligible issues back to the tracker and the store
    pub send_updates: bool,
    /// Rebuild the top-level issue even if its summary is current
    pub regenerate: bool,
    /// Return the top-level prompt instead of calling the model
    pub prompt_only: bool,
}

impl SummarizeOptions {
    #[must_use]
    pub const fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            send_updates: false,
            regenerate: false,
            prompt_only: false,
        }
    }

    #[must_use]
    pub const fn send_updates(mut self, send: bool) -> Self {
        self.send_updates = send;
        self
    }

    #[must_use]
    pub const fn regenerate(mut self, regenerate: bool) -> Self {
        self.regenerate = regenerate;
        self
    }

    #[must_use]
    pub const fn prompt_only(mut self, prompt_only: bool) -> Self {
        self.prompt_only = prompt_only;
        self
    }
}

/// State for one top-level summarization.
pub struct SummaryBuilder<'a> {
    engine: &'a Engine,
    store: &'a mut SqliteStorage,
    currency: CurrencyCheck<'a>,
    memo: HashMap<IssueKey, String>,
    path: HashSet<IssueKey>,
    llm_calls: usize,
    posted: Vec<IssueKey>,
}

impl<'a> SummaryBuilder<'a> {
    #[must_use]
    pub fn new(engine: &'a Engine, store: &'a mut SqliteStorage) -> Self {
        Self {
            engine,
            store,
            currency: CurrencyCheck::new(engine),
            memo: HashMap::new(),
            path: HashSet::new(),
            llm_calls: 0,
            posted: Vec::new(),
        }
    }

    /// Model invocations made so far.
    #[must_use]
    pub const fn llm_calls(&self) -> usize {
        self.llm_calls
    }

    /// Issues whose summaries were posted, in posting order.
    #[must_use]
    pub fn posted(&self) -> &[IssueKey] {
        &self.posted
    }

    /// Summarize `issue`, recursing into children as the options allow.
    ///
    /// # Errors
    ///
    /// Fails fast on any tracker, model or store failure; nothing after the
    /// failing step is attempted.
    pub fn summarize(&mut self, issue: &Issue, opts: SummarizeOptions) -> Result<String> {
        info!(key = %issue.key, max_depth = opts.max_depth, "Summarizing");
        self.summarize_at(issue, opts, 0, true)
    }

    fn summarize_at(
        &mut self,
        issue: &Issue,
        opts: SummarizeOptions,
        depth: usize,
        top: bool,
    ) -> Result<String> {
        if let Some(done) = self.memo.get(&issue.key) {
            debug!(key = %issue.key, "Already summarized in this call");
            return Ok(done.clone());
        }

        let regenerate = top && opts.regenerate;
        if !regenerate && self.currency.is_current(issue)? {
            if let Some(text) = self.stored_summary(issue)? {
                debug!(key = %issue.key, "Summary is current, reusing it");
                self.memo.insert(issue.key.clone(), text.clone());
                return Ok(text);
            }
            debug!(key = %issue.key, "Summary is current but nothing is stored, building");
        }

        self.path.insert(issue.key.clone());
        let block = self.render(issue, opts, depth);
        self.path.remove(&issue.key);
        let prompt = build_prompt(issue.level, &block?);

        if top && opts.prompt_only {
            return Ok(prompt);
        }

        info!(key = %issue.key, depth, "Summarizing via model");
        debug!(key = %issue.key, %prompt, "Prompt");
        let summary = self.engine.summarizer.complete(&prompt)?.trim().to_string();
        self.llm_calls += 1;

        if opts.send_updates && self.engine.is_eligible(issue) {
            self.post(issue, &summary)?;
        }

        self.memo.insert(issue.key.clone(), summary.clone());
        Ok(summary)
    }

    /// Summary text already published for `issue`: a fresh store record,
    /// else the marker block in its summary field.
    ///
    /// Refresh and rollup write only the store, so its record can be newer.
    fn stored_summary(&self, issue: &Issue) -> Result<Option<String>> {
        if let Some(text) = self.store.get_summary(&issue.key, false)? {
            return Ok(Some(text));
        }
        Ok(self
            .engine
            .markers
            .get(&issue.status_summary)
            .filter(|t| !t.is_empty())
            .map(str::to_string))
    }

    fn post(&mut self, issue: &Issue, summary: &str) -> Result<()> {
        let engine = self.engine;
        let wrapped = fill(summary, engine.config.wrap_column, "");
        let field = engine.markers.upsert(&issue.status_summary, &wrapped);
        issue.update_status_summary(&engine.cache, &field)?;
        self.store
            .update_summary(&issue.key, summary, issue.parent_key.as_ref())?;

        self.currency.forget(&issue.key);
        if let Some(parent) = &issue.parent_key {
            self.currency.forget(parent);
        }
        self.posted.push(issue.key.clone());
        Ok(())
    }

    /// Summary for one child, or `None` to reference it by key only.
    fn child_summary(
        &mut self,
        child_key: &IssueKey,
        opts: SummarizeOptions,
        depth: usize,
    ) -> Result<Option<String>> {
        if self.path.contains(child_key) {
            warn!(child = %child_key, "Child is also an ancestor, not recursing");
            return Ok(None);
        }

        if depth >= opts.max_depth {
            return Ok(None);
        }
        let child = self.engine.cache.get(child_key)?;
        if opts.prompt_only {
            return self.stored_summary(&child);
        }

        let child_depth = if self.engine.is_eligible(&child) {
            0
        } else {
            depth + 1
        };
        let summary = self.summarize_at(&child, opts, child_depth, false)?;
        Ok(Some(summary).filter(|s| !s.is_empty()))
    }

    fn render(&mut self, issue: &Issue, opts: SummarizeOptions, depth: usize) -> Result<String> {
        let engine = self.engine;
        let cache = &engine.cache;
        let wrap = engine.config.wrap_column;

        let mut children = Vec::new();
        for child in issue.children(cache)? {
            let summary = self.child_summary(&child.key, opts, depth)?;
            children.push((child, summary));
        }

        let mut comments = String::new();
        for comment in issue.comments(cache)? {
            comments.push_str(&format!(
                "On {}, {} said:\n{}\n",
                comment.created.format("%Y-%m-%d %H:%M"),
                comment.author,
                fill(&comment.body, wrap, "  ")
            ));
        }

        let mut related = String::new();
        for link in issue.related(cache)?.iter().filter(|r| !r.is_child) {
            let other = cache.get(&link.key)?;
            related.push_str(&format!("* {} {} {}\n", issue.key, link.describe(), other));
        }
        for (child, summary) in children {
            match summary {
                Some(summary) => related.push_str(&format!(
                    "* {} {} {} which can be summarized as:\n{}\n",
                    issue.key,
                    child.how,
                    child.key,
                    fill(&summary, wrap, "  ")
                )),
                None => {
                    let other = cache.get(&child.key)?;
                    related.push_str(&format!("* {} {} {}\n", issue.key, child.how, other));
                }
            }
        }

        let mut block = format!(
            "Title: {} - {}\nStatus/Resolution: {}/{}\n",
            issue.key, issue.summary, issue.status, issue.resolution
        );
        if issue.blocked {
            if issue.blocked_reason.trim().is_empty() {
                block.push_str("This issue is BLOCKED.\n");
            } else {
                block.push_str(&format!("This issue is BLOCKED: {}\n", issue.blocked_reason.trim()));
            }
        }
        block.push_str(&format!(
            "\n=== Description ===\n{}\n\n=== Comments ===\n{}\n=== Related Issues ===\n{}",
            engine.markers.remove(&issue.description).trim(),
            comments,
            related
        ));
        Ok(block)
    }
}

/// A fresh store record for `issue`, else a newly built summary saved to the
/// store (marking its parent stale). Nothing is posted to the tracker.
///
/// # Errors
///
/// Propagates store, tracker and model failures.
pub fn get_or_update_summary(
    engine: &Engine,
    store: &mut SqliteStorage,
    issue: &Issue,
    max_depth: usize,
) -> Result<String> {
    if let Some(text) = store.get_summary(&issue.key, false)? {
        return Ok(text);
    }
    let summary = SummaryBuilder::new(engine, store).summarize(issue, SummarizeOptions::new(max_depth))?;
    store.update_summary(&issue.key, &summary, issue.parent_key.as_ref())?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble_tiers() {
        assert_eq!(preamble_for_level(0), IMPLEMENTER_PREAMBLE);
        assert_eq!(preamble_for_level(2), IMPLEMENTER_PREAMBLE);
        assert_eq!(preamble_for_level(3), PRODUCT_MANAGER_PREAMBLE);
        assert_eq!(preamble_for_level(4), EXECUTIVE_PREAMBLE);
        assert_eq!(preamble_for_level(6), EXECUTIVE_PREAMBLE);
    }

    #[test]
    fn test_prompt_wraps_block() {
        let prompt = build_prompt(3, "Title: A-1 - Thing\n\n");
        assert!(prompt.starts_with(PRODUCT_MANAGER_PREAMBLE));
        assert!(prompt.contains("```\nTitle: A-1 - Thing\n```"));
    }

    #[test]
    fn test_options_builders() {
        let opts = SummarizeOptions::new(2).send_updates(true).prompt_only(true);
        assert_eq!(opts.max_depth, 2);
        assert!(opts.send_updates);
        assert!(opts.prompt_only);
        assert!(!opts.regenerate);
    }
}
