use aisummary::model::{ChangeEntry, ChangeItem, Comment, IssueKey, User};
use aisummary::source::{SnapshotLink, SnapshotRecord};
use aisummary::util::SummaryMarkers;
use chrono::{DateTime, Duration, TimeZone, Utc};

use super::key;

/// A fixed point well in the past so `Utc::now()` writes always sort after it.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

pub fn at(minutes: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(minutes)
}

pub fn user(name: &str) -> User {
    User {
        name: name.to_lowercase().replace(' ', "."),
        display_name: name.to_string(),
    }
}

/// Builder for snapshot records.
pub struct RecordBuilder {
    record: SnapshotRecord,
}

impl RecordBuilder {
    pub fn new(k: &str, issue_type: &str) -> Self {
        Self {
            record: SnapshotRecord::new(key(k), issue_type, t0()),
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.record.fields.summary = title.to_string();
        self
    }

    pub fn description(mut self, text: &str) -> Self {
        self.record.fields.description = text.to_string();
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.record.fields.status = status.to_string();
        self
    }

    pub fn labeled(mut self) -> Self {
        self.record.fields.labels.insert("AISummary".to_string());
        self
    }

    /// A summary previously posted between the markers.
    pub fn posted_summary(mut self, text: &str) -> Self {
        self.record.fields.status_summary = SummaryMarkers::default().wrap(text, 78);
        self
    }

    pub fn updated(mut self, when: DateTime<Utc>) -> Self {
        self.record.fields.updated = when;
        self
    }

    /// Structural parent (sub-task style).
    pub fn parent(mut self, k: &str) -> Self {
        self.record.fields.parent = Some(key(k));
        self
    }

    pub fn epic(mut self, k: &str) -> Self {
        self.record.fields.epic_link = Some(key(k));
        self
    }

    pub fn parent_link(mut self, k: &str) -> Self {
        self.record.fields.parent_link = Some(key(k));
        self
    }

    pub fn assignee(mut self, name: &str) -> Self {
        self.record.fields.assignee = Some(user(name));
        self
    }

    pub fn contributor(mut self, name: &str) -> Self {
        self.record.fields.contributors.insert(user(name));
        self
    }

    pub fn comment(mut self, author: &str, when: DateTime<Utc>, body: &str) -> Self {
        self.record.comments.push(Comment {
            author: author.to_string(),
            created: when,
            body: body.to_string(),
        });
        self
    }

    pub fn link(mut self, k: &str, how: &str) -> Self {
        self.record.links.push(SnapshotLink {
            key: key(k),
            how: how.to_string(),
        });
        self
    }

    /// A changelog entry by `author` touching `field` at `when`.
    pub fn change(mut self, author: &str, when: DateTime<Utc>, field: &str) -> Self {
        self.record.changelog.push(ChangeEntry {
            author: author.to_string(),
            created: when,
            items: vec![ChangeItem {
                field: field.to_string(),
                from: None,
                to: Some("x".to_string()),
            }],
        });
        self
    }

    pub fn build(self) -> SnapshotRecord {
        self.record
    }
}

pub fn record(k: &str, issue_type: &str) -> RecordBuilder {
    RecordBuilder::new(k, issue_type)
}

/// A linear chain `A-1 <- A-2 <- ... <- A-n` of unlabeled tasks, each the
/// structural parent of the next.
pub fn unlabeled_chain(n: u64) -> Vec<SnapshotRecord> {
    (1..=n)
        .map(|i| {
            let mut builder = record(&format!("A-{i}"), "Task").title(&format!("Step {i}"));
            if i > 1 {
                builder = builder.parent(&format!("A-{}", i - 1));
            }
            builder.build()
        })
        .collect()
}

pub fn keys(list: &[&str]) -> Vec<IssueKey> {
    list.iter().map(|k| key(k)).collect()
}
