//! `SQLite` storage implementation of the summary store.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;
use crate::model::IssueKey;
use crate::storage::schema::apply_schema;
use crate::util::time::{from_stored, to_stored};

/// SQLite-based summary store.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Context for a mutation, shared by every statement in its transaction.
#[derive(Debug)]
pub struct MutationContext {
    pub op_name: String,
    /// One timestamp for every row the mutation touches
    pub now: DateTime<Utc>,
    /// Keys this mutation newly marked stale
    pub marked_stale: Vec<IssueKey>,
}

impl MutationContext {
    #[must_use]
    pub fn new(op_name: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            now: Utc::now(),
            marked_stale: Vec::new(),
        }
    }
}

/// One row of the summary table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRecord {
    pub issue_key: IssueKey,
    pub summary: Option<String>,
    pub summary_ts: Option<DateTime<Utc>>,
    pub stale_ts: Option<DateTime<Utc>>,
    pub parent_key: Option<IssueKey>,
}

impl SummaryRecord {
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        self.stale_ts.is_some()
    }
}

/// What `mark_stale` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkOutcome {
    /// Stale timestamp set now (placeholder created if needed)
    Marked,
    /// Already stale; the earlier timestamp was kept
    AlreadyStale,
    /// No record and creation was not allowed
    NotFound,
}

/// Summary table totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    /// Generated and not stale
    pub fresh: usize,
    pub stale: usize,
    /// Placeholders never generated
    pub pending: usize,
}

type RowTuple = (
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RowTuple> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn to_record((key, summary, summary_ts, stale_ts, parent): RowTuple) -> Result<SummaryRecord> {
    Ok(SummaryRecord {
        issue_key: IssueKey::parse(&key)?,
        summary,
        summary_ts: summary_ts
            .as_deref()
            .map(|s| from_stored(s, "summary_ts"))
            .transpose()?,
        stale_ts: stale_ts
            .as_deref()
            .map(|s| from_stored(s, "stale_ts"))
            .transpose()?,
        parent_key: parent.as_deref().map(IssueKey::parse).transpose()?,
    })
}

const SELECT_RECORD: &str =
    "SELECT issue_key, ai_summary, summary_ts, stale_ts, parent_key FROM ai_summary";

impl SqliteStorage {
    /// Open (creating if needed) the summary store at `path`.
    ///
    /// # Errors
    ///
    /// Returns a database error if the file cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Like `open`, waiting up to `lock_timeout_ms` for a competing writer.
    ///
    /// # Errors
    ///
    /// Returns a database error if the file cannot be opened or migrated.
    pub fn open_with_timeout(path: &Path, lock_timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        if let Some(timeout) = lock_timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        }
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open a throwaway in-memory store.
    ///
    /// # Errors
    ///
    /// Returns a database error if the schema cannot be applied.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Run `f` inside one IMMEDIATE transaction.
    ///
    /// # Errors
    ///
    /// Returns the first error from `f` or the database. The transaction is
    /// rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let mut ctx = MutationContext::new(op);

        let result = f(&tx, &mut ctx)?;

        tx.commit()?;

        if !ctx.marked_stale.is_empty() {
            debug!(op = %ctx.op_name, marked = ?ctx.marked_stale, "Marked summaries stale");
        }
        Ok(result)
    }

    /// Current summary text for `key`.
    ///
    /// Stale records yield `None` unless `stale_ok`; placeholders always yield `None`.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub fn get_summary(&self, key: &IssueKey, stale_ok: bool) -> Result<Option<String>> {
        let row: Option<(Option<String>, Option<String>)> = self
            .conn
            .query_row(
                "SELECT ai_summary, stale_ts FROM ai_summary WHERE issue_key = ?",
                [key.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(match row {
            Some((summary, stale_ts)) if stale_ok || stale_ts.is_none() => summary,
            _ => None,
        })
    }

    /// Full record for `key`, stale or not.
    ///
    /// # Errors
    ///
    /// Returns a database error, or a parse error for a corrupt row.
    pub fn get_record(&self, key: &IssueKey) -> Result<Option<SummaryRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("{SELECT_RECORD} WHERE issue_key = ?"),
                [key.to_string()],
                read_row,
            )
            .optional()?;
        row.map(to_record).transpose()
    }

    /// Store a fresh summary for `key` and mark its parent stale.
    ///
    /// In one transaction: upsert the record with a new `summary_ts` and a
    /// cleared `stale_ts`; then, if `parent` is given, set the parent's
    /// `stale_ts` to now unless it is already stale. A parent with no record
    /// gets a stale placeholder so it enters the backlog.
    ///
    /// # Errors
    ///
    /// Returns a database error; nothing is written in that case.
    pub fn update_summary(
        &mut self,
        key: &IssueKey,
        summary: &str,
        parent: Option<&IssueKey>,
    ) -> Result<()> {
        self.mutate("update_summary", |tx, ctx| {
            let now = to_stored(ctx.now);
            tx.execute(
                "INSERT INTO ai_summary (issue_key, ai_summary, summary_ts, stale_ts, parent_key)
                 VALUES (?1, ?2, ?3, NULL, ?4)
                 ON CONFLICT(issue_key) DO UPDATE SET
                    ai_summary = excluded.ai_summary,
                    summary_ts = excluded.summary_ts,
                    stale_ts = NULL,
                    parent_key = excluded.parent_key",
                params![key.to_string(), summary, now, parent.map(ToString::to_string)],
            )?;

            if let Some(parent) = parent {
                if mark_stale_in_tx(tx, parent, true, &now)? == MarkOutcome::Marked {
                    ctx.marked_stale.push(parent.clone());
                }
            }
            Ok(())
        })
    }

    /// Mark `key` stale.
    ///
    /// An already-stale record keeps its original timestamp. A missing record
    /// is created as a stale placeholder only when `add_ok`.
    ///
    /// # Errors
    ///
    /// Returns a database error if the write fails.
    pub fn mark_stale(&mut self, key: &IssueKey, add_ok: bool) -> Result<MarkOutcome> {
        self.mutate("mark_stale", |tx, ctx| {
            let outcome = mark_stale_in_tx(tx, key, add_ok, &to_stored(ctx.now))?;
            if outcome == MarkOutcome::Marked {
                ctx.marked_stale.push(key.clone());
            }
            Ok(outcome)
        })
    }

    /// Stale keys, oldest staleness first. A `limit` of 0 means no limit.
    ///
    /// # Errors
    ///
    /// Returns a database error, or `InvalidKey` for a corrupt row.
    pub fn get_stale_issues(&self, limit: usize) -> Result<Vec<IssueKey>> {
        let limit = if limit == 0 {
            -1
        } else {
            i64::try_from(limit).unwrap_or(i64::MAX)
        };
        let mut stmt = self.conn.prepare(
            "SELECT issue_key FROM ai_summary
             WHERE stale_ts IS NOT NULL
             ORDER BY stale_ts ASC, issue_key ASC
             LIMIT ?",
        )?;
        let keys = stmt
            .query_map([limit], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        keys.iter().map(|k| IssueKey::parse(k)).collect()
    }

    /// Records whose parent is `key`.
    ///
    /// # Errors
    ///
    /// Returns a database error, or a parse error for a corrupt row.
    pub fn get_children(&self, key: &IssueKey) -> Result<Vec<SummaryRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_RECORD} WHERE parent_key = ? ORDER BY issue_key"))?;
        let rows = stmt
            .query_map([key.to_string()], read_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(to_record).collect()
    }

    /// Totals over the summary table.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub fn stats(&self) -> Result<StoreStats> {
        let stats = self.conn.query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN stale_ts IS NULL AND ai_summary IS NOT NULL THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN stale_ts IS NOT NULL THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN ai_summary IS NULL THEN 1 ELSE 0 END), 0)
             FROM ai_summary",
            [],
            |row| {
                Ok(StoreStats {
                    total: row.get(0)?,
                    fresh: row.get(1)?,
                    stale: row.get(2)?,
                    pending: row.get(3)?,
                })
            },
        )?;
        Ok(stats)
    }

    /// Get a config value.
    ///
    /// # Errors
    ///
    /// Returns a database error if the read fails.
    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM config WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Get all config values.
    ///
    /// # Errors
    ///
    /// Returns a database error if the read fails.
    pub fn get_all_config(&self) -> Result<HashMap<String, String>> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM config")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut map = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Set a config value.
    ///
    /// # Errors
    ///
    /// Returns a database error if the write fails.
    pub fn set_config(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO config (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Delete a config value. Returns whether a row went away.
    ///
    /// # Errors
    ///
    /// Returns a database error if the write fails.
    pub fn delete_config(&mut self, key: &str) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM config WHERE key = ?", [key])?;
        Ok(deleted > 0)
    }

    /// Get a metadata value.
    ///
    /// # Errors
    ///
    /// Returns a database error if the read fails.
    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a metadata value.
    ///
    /// # Errors
    ///
    /// Returns a database error if the write fails.
    pub fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)",
            [key, value],
        )?;
        Ok(())
    }
}

/// Set `stale_ts = now` on `key` unless already stale.
fn mark_stale_in_tx(
    tx: &Transaction,
    key: &IssueKey,
    add_ok: bool,
    now: &str,
) -> Result<MarkOutcome> {
    let existing: Option<Option<String>> = tx
        .query_row(
            "SELECT stale_ts FROM ai_summary WHERE issue_key = ?",
            [key.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(Some(_)) => Ok(MarkOutcome::AlreadyStale),
        Some(None) => {
            tx.execute(
                "UPDATE ai_summary SET stale_ts = ? WHERE issue_key = ?",
                params![now, key.to_string()],
            )?;
            Ok(MarkOutcome::Marked)
        }
        None if add_ok => {
            tx.execute(
                "INSERT INTO ai_summary (issue_key, stale_ts) VALUES (?, ?)",
                params![key.to_string(), now],
            )?;
            Ok(MarkOutcome::Marked)
        }
        None => Ok(MarkOutcome::NotFound),
    }
}
