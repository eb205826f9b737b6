//! Database schema definitions and version check.

use rusqlite::Connection;

use crate::error::{Result, SummaryError};

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the summary database.
pub const SCHEMA_SQL: &str = r"
    -- One row per issue that has, or is waiting for, an AI summary.
    -- stale_ts NULL means fresh; ai_summary NULL means never generated.
    CREATE TABLE IF NOT EXISTS ai_summary (
        issue_key TEXT PRIMARY KEY,
        ai_summary TEXT,
        summary_ts TEXT,
        stale_ts TEXT,
        parent_key TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_ai_summary_stale ON ai_summary(stale_ts)
        WHERE stale_ts IS NOT NULL;
    CREATE INDEX IF NOT EXISTS idx_ai_summary_parent ON ai_summary(parent_key);

    -- Layered configuration stored in the database
    CREATE TABLE IF NOT EXISTS config (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    -- Internal bookkeeping such as the polling watermark
    CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// Create tables if missing and stamp the schema version.
///
/// # Errors
///
/// Returns `SchemaMismatch` if the database was written by a newer schema,
/// or a database error if statements fail.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    let found: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if found > CURRENT_SCHEMA_VERSION {
        return Err(SummaryError::SchemaMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found,
        });
    }

    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;

    // WAL lets the poller and one-off commands share the file
    conn.pragma_update(None, "journal_mode", "WAL")?;

    Ok(())
}
