//! Summary freshness and propagation.
//!
//! [`Engine`] bundles what every operation needs: the issue cache, the
//! summarizer, resolved configuration and the identity our writes carry.
//! The summary store is passed separately because writes need `&mut`.

mod builder;
mod currency;
mod estimate;
mod rollup;
mod select;

pub use builder::{
    SummarizeOptions, SummaryBuilder, build_prompt, get_or_update_summary, preamble_for_level,
};
pub use currency::{
    CurrencyCheck, DEFAULT_UNLABELED_POLICY, UnlabeledPolicy, last_summary_update,
};
pub use estimate::{IssueEstimate, estimate_issue};
pub use rollup::{
    Categories, RollupItem, RollupOptions, RollupReport, categorize, collect_rollup, descendants,
    is_active, rollup_contributors,
};
pub use select::{Selection, next_watermark, select_for_iteration};

use std::fmt;
use std::sync::Arc;

use crate::cache::IssueCache;
use crate::config::SummarizerConfig;
use crate::llm::Summarizer;
use crate::model::Issue;
use crate::util::SummaryMarkers;

/// Shared context for summarization, selection and rollups.
pub struct Engine {
    pub cache: Arc<IssueCache>,
    pub summarizer: Arc<dyn Summarizer>,
    pub config: SummarizerConfig,
    /// Display name our tracker writes are authored under
    pub identity: String,
    pub markers: SummaryMarkers,
}

impl Engine {
    #[must_use]
    pub fn new(
        cache: Arc<IssueCache>,
        summarizer: Arc<dyn Summarizer>,
        config: SummarizerConfig,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            summarizer,
            config,
            identity: identity.into(),
            markers: SummaryMarkers::default(),
        }
    }

    /// Opt-in label present and project allowed.
    #[must_use]
    pub fn is_eligible(&self, issue: &Issue) -> bool {
        self.config.is_eligible(issue)
    }

    /// Whether a changelog author is us, under the current or a legacy name.
    #[must_use]
    pub fn is_own_author(&self, author: &str) -> bool {
        author == self.identity || self.config.legacy_identities.iter().any(|l| l == author)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("cache", &self.cache)
            .field("identity", &self.identity)
            .field("label", &self.config.label)
            .finish_non_exhaustive()
    }
}
