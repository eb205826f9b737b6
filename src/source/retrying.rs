use crate::error::Result;
use crate::model::{ChangeEntry, Comment, IssueKey};
use crate::source::{FieldUpdate, Identity, IssueHeader, IssueQuery, IssueSource, RawIssue, RawLink};
use crate::util::retry::{RetryPolicy, with_retry};

/// Wraps a tracker so every call retries transient failures.
pub struct RetryingSource<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: IssueSource> RetryingSource<S> {
    #[must_use]
    pub const fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    #[must_use]
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: IssueSource> IssueSource for RetryingSource<S> {
    fn fetch(&self, key: &IssueKey) -> Result<RawIssue> {
        with_retry(&self.policy, "fetch", || self.inner.fetch(key))
    }

    fn fetch_changelog(&self, key: &IssueKey) -> Result<Vec<ChangeEntry>> {
        with_retry(&self.policy, "fetch_changelog", || {
            self.inner.fetch_changelog(key)
        })
    }

    fn fetch_comments(&self, key: &IssueKey) -> Result<Vec<Comment>> {
        with_retry(&self.policy, "fetch_comments", || {
            self.inner.fetch_comments(key)
        })
    }

    fn fetch_related(&self, key: &IssueKey) -> Result<Vec<RawLink>> {
        with_retry(&self.policy, "fetch_related", || {
            self.inner.fetch_related(key)
        })
    }

    fn query(&self, query: &IssueQuery) -> Result<Vec<IssueHeader>> {
        with_retry(&self.policy, "query", || self.inner.query(query))
    }

    fn update_field(&self, key: &IssueKey, update: &FieldUpdate) -> Result<()> {
        with_retry(&self.policy, "update_field", || {
            self.inner.update_field(key, update)
        })
    }

    fn whoami(&self) -> Result<Identity> {
        with_retry(&self.policy, "whoami", || self.inner.whoami())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorClass, SummaryError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails `whoami` transiently a fixed number of times.
    struct Flaky {
        failures_left: AtomicU32,
    }

    impl IssueSource for Flaky {
        fn fetch(&self, key: &IssueKey) -> Result<RawIssue> {
            Err(SummaryError::IssueNotFound {
                key: key.to_string(),
            })
        }
        fn fetch_changelog(&self, _key: &IssueKey) -> Result<Vec<ChangeEntry>> {
            Ok(Vec::new())
        }
        fn fetch_comments(&self, _key: &IssueKey) -> Result<Vec<Comment>> {
            Ok(Vec::new())
        }
        fn fetch_related(&self, _key: &IssueKey) -> Result<Vec<RawLink>> {
            Ok(Vec::new())
        }
        fn query(&self, _query: &IssueQuery) -> Result<Vec<IssueHeader>> {
            Ok(Vec::new())
        }
        fn update_field(&self, _key: &IssueKey, _update: &FieldUpdate) -> Result<()> {
            Ok(())
        }
        fn whoami(&self) -> Result<Identity> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(SummaryError::upstream(
                    "whoami",
                    ErrorClass::Transient,
                    "429 Too Many Requests",
                ));
            }
            Ok(Identity {
                name: "bot".to_string(),
                display_name: "Bot".to_string(),
                timezone: "UTC".to_string(),
            })
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            multiplier: 1.0,
            max_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_retries_transient_failures() {
        let source = RetryingSource::new(
            Flaky {
                failures_left: AtomicU32::new(2),
            },
            policy(),
        );
        assert_eq!(source.whoami().unwrap().name, "bot");
    }

    #[test]
    fn test_not_found_is_not_retried() {
        let source = RetryingSource::new(
            Flaky {
                failures_left: AtomicU32::new(0),
            },
            policy(),
        );
        let key = IssueKey::parse("X-1").unwrap();
        assert!(matches!(
            source.fetch(&key),
            Err(SummaryError::IssueNotFound { .. })
        ));
    }
}
