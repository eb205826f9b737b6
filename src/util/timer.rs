//! Lightweight timing statistics for the polling loops.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::cache::CacheStats;

/// Accumulated timings for one named block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimerStats {
    pub count: u64,
    pub total: Duration,
}

impl TimerStats {
    #[must_use]
    pub fn average(&self) -> Duration {
        u32::try_from(self.count)
            .ok()
            .filter(|count| *count > 0)
            .map_or(Duration::ZERO, |count| self.total / count)
    }
}

/// Registry of named timers.
#[derive(Debug, Default)]
pub struct Timers {
    stats: Mutex<BTreeMap<String, TimerStats>>,
}

impl Timers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing `name`; the elapsed time is recorded when the guard drops.
    #[must_use]
    pub fn start(&self, name: &str) -> TimerGuard<'_> {
        TimerGuard {
            timers: self,
            name: name.to_string(),
            started: Instant::now(),
        }
    }

    pub fn record(&self, name: &str, elapsed: Duration) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = stats.entry(name.to_string()).or_default();
        entry.count += 1;
        entry.total += elapsed;
    }

    #[must_use]
    pub fn stats(&self, name: &str) -> TimerStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Table of every timer: name, count, average and total seconds.
    #[must_use]
    pub fn report(&self) -> String {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        if stats.is_empty() {
            return String::new();
        }
        let name_width = stats.keys().map(String::len).max().unwrap_or(4).max(4) + 1;
        let mut out = format!("{:<name_width$} {:>8} {:>9}  {:>10}\n", "Name", "Count", "Avg", "Total");
        let rule = out.trim_end().len();
        out.push_str(&"-".repeat(rule));
        out.push('\n');
        for (name, stat) in stats.iter() {
            let _ = writeln!(
                out,
                "{:<name_width$} {:>8} {:>8.3}s {:>10.3}s",
                format!("{name}:"),
                stat.count,
                stat.average().as_secs_f64(),
                stat.total.as_secs_f64()
            );
        }
        out
    }
}

/// Records into its [`Timers`] on drop.
pub struct TimerGuard<'a> {
    timers: &'a Timers,
    name: String,
    started: Instant,
}

impl TimerGuard<'_> {
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timers.record(&self.name, self.started.elapsed());
    }
}

/// Counters for one polling iteration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IterationStats {
    pub selected: usize,
    pub processed: usize,
    pub errors: usize,
    pub hits: u64,
    pub attempts: u64,
    pub elapsed: Duration,
}

impl IterationStats {
    /// Copy cache counters into this iteration's stats.
    pub fn with_cache(&mut self, cache: CacheStats) {
        self.hits = cache.hits;
        self.attempts = cache.attempts;
    }

    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.hits as f64 / self.attempts as f64
        }
    }
}

impl fmt::Display for IterationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} selected, {} processed, {} errors in {:.1}s (cache hit rate {:.0}%)",
            self.selected,
            self.processed,
            self.errors,
            self.elapsed.as_secs_f64(),
            self.hit_rate() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_records_on_drop() {
        let timers = Timers::new();
        {
            let _guard = timers.start("summarize");
        }
        timers.record("summarize", Duration::from_millis(10));
        let stats = timers.stats("summarize");
        assert_eq!(stats.count, 2);
        assert!(stats.total >= Duration::from_millis(10));
        assert_eq!(timers.stats("missing"), TimerStats::default());
    }

    #[test]
    fn test_average() {
        let stats = TimerStats {
            count: 4,
            total: Duration::from_secs(2),
        };
        assert_eq!(stats.average(), Duration::from_millis(500));
        assert_eq!(TimerStats::default().average(), Duration::ZERO);
    }

    #[test]
    fn test_report_lists_timers() {
        let timers = Timers::new();
        assert!(timers.report().is_empty());
        timers.record("llm", Duration::from_secs(3));
        let report = timers.report();
        assert!(report.starts_with("Name"));
        assert!(report.contains("llm:"));
        assert!(report.contains("3.000s"));
        timers.clear();
        assert!(timers.report().is_empty());
    }

    #[test]
    fn test_iteration_display() {
        let mut stats = IterationStats {
            selected: 3,
            processed: 2,
            errors: 1,
            elapsed: Duration::from_millis(1500),
            ..IterationStats::default()
        };
        stats.with_cache(CacheStats {
            hits: 1,
            attempts: 4,
            size: 3,
            max_size: 10,
        });
        assert_eq!(
            stats.to_string(),
            "3 selected, 2 processed, 1 errors in 1.5s (cache hit rate 25%)"
        );
    }
}
