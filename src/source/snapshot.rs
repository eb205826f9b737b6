//! An issue tracker backed by a JSONL snapshot file.
//!
//! One issue per line: the tracker fields plus the changelog, comments and
//! explicit links. Hierarchy edges that a live tracker computes server-side
//! (sub-tasks, issues in an epic, issues under a parent link) are derived
//! from the other records' parent fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::error::{Result, SummaryError};
use crate::model::{
    ChangeEntry, ChangeItem, Comment, HOW_IN_EPIC, HOW_IN_PARENT, HOW_SUBTASK, IssueKey,
};
use crate::source::{FieldUpdate, Identity, IssueHeader, IssueQuery, IssueSource, RawIssue, RawLink};

/// Explicit link stored on a snapshot record.
pub type SnapshotLink = RawLink;

/// One line of the snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    #[serde(flatten)]
    pub fields: RawIssue,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changelog: Vec<ChangeEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<SnapshotLink>,
}

impl SnapshotRecord {
    /// A bare open issue with a generated title.
    #[must_use]
    pub fn new(key: IssueKey, issue_type: &str, updated: DateTime<Utc>) -> Self {
        Self {
            fields: RawIssue {
                summary: format!("Issue {key}"),
                key,
                description: String::new(),
                status: "Open".to_string(),
                resolution: None,
                issue_type: issue_type.to_string(),
                labels: BTreeSet::new(),
                updated,
                status_summary: String::new(),
                blocked: false,
                blocked_reason: None,
                assignee: None,
                contributors: BTreeSet::new(),
                parent: None,
                parent_link: None,
                epic_link: None,
                feature_link: None,
            },
            changelog: Vec::new(),
            comments: Vec::new(),
            links: Vec::new(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &IssueKey {
        &self.fields.key
    }
}

/// Snapshot-file tracker. Writes go back to the file when one is attached.
pub struct SnapshotSource {
    path: Option<PathBuf>,
    identity: Identity,
    summary_field: String,
    records: Mutex<BTreeMap<IssueKey, SnapshotRecord>>,
}

impl SnapshotSource {
    /// Load a snapshot file. Blank lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read and `SnapshotParse` with the
    /// 1-based line number for a record that does not parse.
    pub fn load(path: &Path, identity: Identity) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: SnapshotRecord =
                serde_json::from_str(&line).map_err(|e| SummaryError::SnapshotParse {
                    line: line_num + 1,
                    reason: e.to_string(),
                })?;
            records.push(record);
        }

        info!(path = %path.display(), count = records.len(), "Loaded issue snapshot");
        let mut source = Self::from_records(records, identity);
        source.path = Some(path.to_path_buf());
        Ok(source)
    }

    /// In-memory tracker with no backing file.
    #[must_use]
    pub fn from_records(records: Vec<SnapshotRecord>, identity: Identity) -> Self {
        Self {
            path: None,
            identity,
            summary_field: "Status Summary".to_string(),
            records: Mutex::new(
                records
                    .into_iter()
                    .map(|r| (r.fields.key.clone(), r))
                    .collect(),
            ),
        }
    }

    /// Field name recorded in the changelog for summary writes.
    #[must_use]
    pub fn with_summary_field(mut self, field: impl Into<String>) -> Self {
        self.summary_field = field.into();
        self
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<IssueKey, SnapshotRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing file cannot be rewritten.
    pub fn upsert(&self, record: SnapshotRecord) -> Result<()> {
        let mut records = self.lock();
        self.commit(&mut records, record)
    }

    /// Write `records` with `record` replaced, then swap it in memory. A
    /// failed write leaves the in-memory records untouched.
    fn commit(
        &self,
        records: &mut BTreeMap<IssueKey, SnapshotRecord>,
        record: SnapshotRecord,
    ) -> Result<()> {
        if self.path.is_none() {
            records.insert(record.fields.key.clone(), record);
            return Ok(());
        }
        let mut next = records.clone();
        next.insert(record.fields.key.clone(), record);
        self.save(&next)?;
        *records = next;
        Ok(())
    }

    #[must_use]
    pub fn record(&self, key: &IssueKey) -> Option<SnapshotRecord> {
        self.lock().get(key).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewrite the backing file atomically (temp file, then rename).
    fn save(&self, records: &BTreeMap<IssueKey, SnapshotRecord>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let temp_path = path.with_extension("jsonl.tmp");
        let temp_file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(temp_file);
        for record in records.values() {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| SummaryError::Io(e.into_error()))?
            .sync_all()?;
        fs::rename(&temp_path, path)?;
        debug!(path = %path.display(), count = records.len(), "Rewrote issue snapshot");
        Ok(())
    }

    fn not_found(key: &IssueKey) -> SummaryError {
        SummaryError::IssueNotFound {
            key: key.to_string(),
        }
    }
}

impl IssueSource for SnapshotSource {
    fn fetch(&self, key: &IssueKey) -> Result<RawIssue> {
        self.lock()
            .get(key)
            .map(|r| r.fields.clone())
            .ok_or_else(|| Self::not_found(key))
    }

    fn fetch_changelog(&self, key: &IssueKey) -> Result<Vec<ChangeEntry>> {
        let records = self.lock();
        let record = records.get(key).ok_or_else(|| Self::not_found(key))?;
        let mut changelog = record.changelog.clone();
        changelog.sort_by_key(|entry| entry.created);
        Ok(changelog)
    }

    fn fetch_comments(&self, key: &IssueKey) -> Result<Vec<Comment>> {
        let records = self.lock();
        let record = records.get(key).ok_or_else(|| Self::not_found(key))?;
        let mut comments = record.comments.clone();
        comments.sort_by_key(|comment| comment.created);
        Ok(comments)
    }

    fn fetch_related(&self, key: &IssueKey) -> Result<Vec<RawLink>> {
        let records = self.lock();
        let record = records.get(key).ok_or_else(|| Self::not_found(key))?;
        let fields = &record.fields;
        let mut related = record.links.clone();

        let link = |key: &IssueKey, how: &str| RawLink {
            key: key.clone(),
            how: how.to_string(),
        };

        if let Some(parent) = &fields.parent {
            related.push(link(parent, "is a sub-task of"));
        }
        for (target, how) in [
            (&fields.epic_link, "Epic Link"),
            (&fields.parent_link, "Parent Link"),
            (&fields.feature_link, "Feature Link"),
        ] {
            if let Some(target) = target {
                related.push(link(target, how));
            }
        }

        let is_epic = fields.issue_type == "Epic";
        for other in records.values() {
            let o = &other.fields;
            if o.parent.as_ref() == Some(key) {
                related.push(link(&o.key, HOW_SUBTASK));
            }
            if is_epic && o.epic_link.as_ref() == Some(key) {
                related.push(link(&o.key, HOW_IN_EPIC));
            }
            if !is_epic && o.parent_link.as_ref() == Some(key) {
                related.push(link(&o.key, HOW_IN_PARENT));
            }
        }

        Ok(related)
    }

    fn query(&self, query: &IssueQuery) -> Result<Vec<IssueHeader>> {
        let records = self.lock();
        let mut hits: Vec<IssueHeader> = records
            .values()
            .filter(|r| query.matches(&r.fields))
            .map(|r| IssueHeader {
                key: r.fields.key.clone(),
                updated: r.fields.updated,
            })
            .collect();
        hits.sort_by(|a, b| a.updated.cmp(&b.updated).then_with(|| a.key.cmp(&b.key)));
        if query.limit > 0 {
            hits.truncate(query.limit);
        }
        Ok(hits)
    }

    fn update_field(&self, key: &IssueKey, update: &FieldUpdate) -> Result<()> {
        let mut records = self.lock();
        let mut record = records
            .get(key)
            .cloned()
            .ok_or_else(|| Self::not_found(key))?;
        let now = Utc::now();

        let (from, to) = match update {
            FieldUpdate::StatusSummary(text) => {
                let old = std::mem::replace(&mut record.fields.status_summary, text.clone());
                (old, text.clone())
            }
            FieldUpdate::Labels(labels) => {
                let old = std::mem::replace(&mut record.fields.labels, labels.clone());
                let join = |set: &BTreeSet<String>| set.iter().cloned().collect::<Vec<_>>().join(" ");
                (join(&old), join(labels))
            }
        };

        record.fields.updated = now;
        record.changelog.push(ChangeEntry {
            author: self.identity.display_name.clone(),
            created: now,
            items: vec![ChangeItem {
                field: update.field_name(&self.summary_field).to_string(),
                from: Some(from),
                to: Some(to),
            }],
        });

        self.commit(&mut records, record)
    }

    fn whoami(&self) -> Result<Identity> {
        Ok(self.identity.clone())
    }
}
