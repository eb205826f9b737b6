//! Bounded LRU cache of fetched issue snapshots.
//!
//! One cache is created at startup and handed to everything that reads
//! issues. All table operations run under a single mutex, including the
//! fetch on a miss, so two callers never fetch the same key concurrently.
//!
//! ## Eviction
//!
//! The table is an `lru::LruCache`: every `get` refreshes recency, and a new
//! key arriving at a full table pushes out the least recently used entry.
//! Hits never evict.

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

use crate::error::{Result, SummaryError};
use crate::model::{Issue, IssueKey, LevelTable};
use crate::source::IssueSource;

struct CacheEntry {
    issue: Arc<Issue>,
    inserted: DateTime<Utc>,
    access_count: u64,
}

struct CacheTable {
    entries: LruCache<IssueKey, CacheEntry>,
    hits: u64,
    attempts: u64,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub attempts: u64,
    pub size: usize,
    pub max_size: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the table. 0.0 before the first lookup.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.hits as f64 / self.attempts as f64
        }
    }
}

/// Thread-safe LRU cache keyed by issue key.
pub struct IssueCache {
    source: Arc<dyn IssueSource>,
    levels: LevelTable,
    max_size: usize,
    table: Mutex<CacheTable>,
}

impl IssueCache {
    /// Create an empty cache. A `max_size` of zero is treated as one.
    #[must_use]
    pub fn new(source: Arc<dyn IssueSource>, levels: LevelTable, max_size: usize) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            levels,
            max_size: capacity.get(),
            table: Mutex::new(CacheTable {
                entries: LruCache::new(capacity),
                hits: 0,
                attempts: 0,
            }),
        }
    }

    /// The tracker behind this cache.
    #[must_use]
    pub fn source(&self) -> &dyn IssueSource {
        self.source.as_ref()
    }

    #[must_use]
    pub const fn levels(&self) -> &LevelTable {
        &self.levels
    }

    fn lock(&self) -> MutexGuard<'_, CacheTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached snapshot for `key`, fetching it on a miss.
    ///
    /// # Errors
    ///
    /// Propagates fetch failures unchanged. Returns `Malformed` if the tracker
    /// answers with a different key than requested.
    pub fn get(&self, key: &IssueKey) -> Result<Arc<Issue>> {
        let mut table = self.lock();
        table.attempts += 1;

        let CacheTable { entries, hits, .. } = &mut *table;
        if let Some(entry) = entries.get_mut(key) {
            entry.access_count += 1;
            *hits += 1;
            trace!(%key, access_count = entry.access_count, "Issue cache hit");
            return Ok(Arc::clone(&entry.issue));
        }

        debug!(%key, "Issue cache miss, fetching");
        let raw = self.source.fetch(key)?;
        if raw.key != *key {
            return Err(SummaryError::malformed(
                key.to_string(),
                format!("tracker returned {}", raw.key),
            ));
        }
        let issue = Arc::new(Issue::from_raw(raw, &self.levels)?);

        let entry = CacheEntry {
            issue: Arc::clone(&issue),
            inserted: Utc::now(),
            access_count: 1,
        };
        if let Some((evicted, _)) = table.entries.push(key.clone(), entry) {
            trace!(key = %evicted, "Evicted least recently used issue");
        }
        Ok(issue)
    }

    /// Drop `key` from the table. Absent keys are ignored.
    pub fn remove(&self, key: &IssueKey) {
        if self.lock().entries.pop(key).is_some() {
            debug!(%key, "Removed issue from cache");
        }
    }

    /// Drop every entry inserted before `cutoff`. Returns how many went.
    pub fn remove_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut table = self.lock();
        let expired: Vec<IssueKey> = table
            .entries
            .iter()
            .filter(|(_, entry)| entry.inserted < cutoff)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            table.entries.pop(key);
        }
        let removed = expired.len();
        if removed > 0 {
            debug!(removed, %cutoff, "Expired cached issues");
        }
        removed
    }

    /// Empty the table. Counters are kept.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    #[must_use]
    pub fn contains(&self, key: &IssueKey) -> bool {
        self.lock().entries.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let table = self.lock();
        CacheStats {
            hits: table.hits,
            attempts: table.attempts,
            size: table.entries.len(),
            max_size: self.max_size,
        }
    }
}

impl std::fmt::Debug for IssueCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssueCache")
            .field("max_size", &self.max_size)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
