//! Error types and handling for `aisummary`.
//!
//! # Design
//!
//! - Uses `thiserror` for derive-based error types
//! - Every error carries an [`ErrorClass`]: transient failures may be retried
//!   by the collaborator that produced them, everything else is fatal for the
//!   current issue
//! - Provides recovery hints for user-facing errors
//! - Provides structured JSON output for scripted callers

mod structured;

pub use structured::{ErrorCode, StructuredError};

use thiserror::Error;

/// Whether an upstream failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Network hiccup, rate limit, timeout: the same call may succeed later.
    Transient,
    /// Permission denied, bad input, broken data: retrying will not help.
    Permanent,
}

impl ErrorClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary error type for `aisummary` operations.
#[derive(Error, Debug)]
pub enum SummaryError {
    // === Storage Errors ===
    /// `SQLite` database error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database schema version doesn't match expected.
    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: i32, found: i32 },

    // === Issue Errors ===
    /// Issue key is not of the form `PREFIX-NUMBER`.
    #[error("Invalid issue key: {key}")]
    InvalidKey { key: String },

    /// The tracker has no issue with this key.
    #[error("Issue not found: {key}")]
    IssueNotFound { key: String },

    /// The tracker answered with something we could not interpret.
    #[error("Malformed response for {key}: {reason}")]
    Malformed { key: String, reason: String },

    /// Walking parent links came back around to an issue already visited.
    #[error("Cyclic parent chain at {key}: {chain}")]
    ParentCycle { key: String, chain: String },

    // === Upstream Errors ===
    /// A tracker call failed.
    #[error("Tracker {operation} failed ({class}): {message}")]
    Upstream {
        operation: String,
        class: ErrorClass,
        message: String,
    },

    /// The language model call failed.
    #[error("Summarizer failed ({class}): {message}")]
    Summarizer { class: ErrorClass, message: String },

    /// Prompt exceeds what the model (or its tokenizer) accepts.
    #[error("Prompt too large: {tokens} tokens exceeds limit of {limit}")]
    PromptTooLarge { tokens: usize, limit: usize },

    // === Snapshot Errors ===
    /// Failed to parse a line in the issues snapshot file.
    #[error("Snapshot parse error at line {line}: {reason}")]
    SnapshotParse { line: usize, reason: String },

    // === Validation / Configuration ===
    /// Field validation failed.
    #[error("Validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    // === I/O Errors ===
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Wrapped anyhow error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SummaryError {
    /// Transient or permanent. Only upstream and summarizer failures can be
    /// transient; a locked database is transient as well.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Upstream { class, .. } | Self::Summarizer { class, .. } => *class,
            Self::Database(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                ErrorClass::Transient
            }
            _ => ErrorClass::Permanent,
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Can the user fix this without code changes?
    #[must_use]
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidKey { .. }
                | Self::IssueNotFound { .. }
                | Self::Validation { .. }
                | Self::Config(_)
        )
    }

    /// Human-friendly suggestion for fixing this error.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::InvalidKey { .. } => Some("Issue keys look like ABC-123"),
            Self::ParentCycle { .. } => Some("Fix the parent links in the tracker to break the cycle"),
            Self::PromptTooLarge { .. } => Some("Lower --max-depth or raise max-prompt-tokens"),
            Self::Config(_) => Some("Check .aisum/config.yaml and AISUM_* environment variables"),
            _ => None,
        }
    }

    /// Convenience constructor for tracker failures.
    #[must_use]
    pub fn upstream(
        operation: impl Into<String>,
        class: ErrorClass,
        message: impl Into<String>,
    ) -> Self {
        Self::Upstream {
            operation: operation.into(),
            class,
            message: message.into(),
        }
    }

    /// Create a validation error for a specific field.
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a malformed-response error.
    #[must_use]
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Result type using `SummaryError`.
pub type Result<T> = std::result::Result<T, SummaryError>;
