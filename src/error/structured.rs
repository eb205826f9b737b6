//! Structured error output for scripted callers.
//!
//! Every `SummaryError` maps to a stable `ErrorCode`, an exit code and an
//! optional hint. Loops driving `aisum` read `retryable` to decide whether
//! to run the same window again.

use crate::error::{ErrorClass, SummaryError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Stable error codes, grouped by exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // === Database Errors (exit code 2) ===
    DatabaseError,
    DatabaseLocked,
    SchemaMismatch,

    // === Issue Errors (exit code 3) ===
    InvalidKey,
    IssueNotFound,
    MalformedResponse,
    ParentCycle,

    // === Upstream Errors (exit code 4) ===
    UpstreamTransient,
    UpstreamPermanent,
    SummarizerFailed,
    PromptTooLarge,

    // === Validation / Config Errors (exit code 5) ===
    ValidationFailed,
    ConfigError,

    // === I/O Errors (exit code 6) ===
    SnapshotParseError,
    IoError,
    JsonError,
    YamlError,

    // === Internal Errors (exit code 1) ===
    InternalError,
}

impl ErrorCode {
    /// Get the string representation for JSON output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::DatabaseLocked => "DATABASE_LOCKED",
            Self::SchemaMismatch => "SCHEMA_MISMATCH",
            Self::InvalidKey => "INVALID_KEY",
            Self::IssueNotFound => "ISSUE_NOT_FOUND",
            Self::MalformedResponse => "MALFORMED_RESPONSE",
            Self::ParentCycle => "PARENT_CYCLE",
            Self::UpstreamTransient => "UPSTREAM_TRANSIENT",
            Self::UpstreamPermanent => "UPSTREAM_PERMANENT",
            Self::SummarizerFailed => "SUMMARIZER_FAILED",
            Self::PromptTooLarge => "PROMPT_TOO_LARGE",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::SnapshotParseError => "SNAPSHOT_PARSE_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::YamlError => "YAML_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Whether waiting and retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::DatabaseLocked | Self::UpstreamTransient)
    }

    /// Exit code grouped by category:
    /// - 1: Internal/unknown errors
    /// - 2: Database errors
    /// - 3: Issue errors
    /// - 4: Upstream errors
    /// - 5: Validation/config errors
    /// - 6: I/O errors
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::DatabaseError | Self::DatabaseLocked | Self::SchemaMismatch => 2,
            Self::InvalidKey | Self::IssueNotFound | Self::MalformedResponse | Self::ParentCycle => {
                3
            }
            Self::UpstreamTransient
            | Self::UpstreamPermanent
            | Self::SummarizerFailed
            | Self::PromptTooLarge => 4,
            Self::ValidationFailed | Self::ConfigError => 5,
            Self::SnapshotParseError | Self::IoError | Self::JsonError | Self::YamlError => 6,
            Self::InternalError => 1,
        }
    }
}

/// Structured error for machine-parseable output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Machine-readable error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional hint for fixing the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether the operation can be retried
    pub retryable: bool,
    /// Additional context data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl StructuredError {
    /// Create a new structured error from a `SummaryError`.
    #[must_use]
    pub fn from_error(err: &SummaryError) -> Self {
        let (code, context) = Self::extract_code_and_context(err);
        let hint = err.suggestion().map(str::to_string);

        Self {
            code,
            message: err.to_string(),
            hint,
            retryable: code.is_retryable(),
            context,
        }
    }

    /// Error for a request that is missing a required parameter.
    #[must_use]
    pub fn missing_parameter(name: &str) -> Self {
        Self {
            code: ErrorCode::ValidationFailed,
            message: format!("Missing required parameter \"{name}\""),
            hint: None,
            retryable: false,
            context: Some(json!({ "parameter": name })),
        }
    }

    /// Serialize to JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "hint": self.hint,
                "retryable": self.retryable,
                "context": self.context,
            }
        })
    }

    /// Format for human-readable output.
    #[must_use]
    pub fn to_human(&self, color: bool) -> String {
        let paint = |label: &str, ansi: &str| {
            if color {
                format!("\x1b[{ansi}m{label}:\x1b[0m ")
            } else {
                format!("{label}: ")
            }
        };
        let mut lines = vec![format!("{}{}", paint("Error", "31"), self.message)];
        if let Some(hint) = &self.hint {
            lines.push(format!("{}{hint}", paint("Hint", "33")));
        }
        lines.join("\n")
    }

    fn extract_code_and_context(err: &SummaryError) -> (ErrorCode, Option<Value>) {
        match err {
            SummaryError::Database(_) => {
                if err.is_transient() {
                    (ErrorCode::DatabaseLocked, None)
                } else {
                    (ErrorCode::DatabaseError, None)
                }
            }
            SummaryError::SchemaMismatch { expected, found } => (
                ErrorCode::SchemaMismatch,
                Some(json!({"expected": expected, "found": found})),
            ),
            SummaryError::InvalidKey { key } => (ErrorCode::InvalidKey, Some(json!({"key": key}))),
            SummaryError::IssueNotFound { key } => {
                (ErrorCode::IssueNotFound, Some(json!({"key": key})))
            }
            SummaryError::Malformed { key, reason } => (
                ErrorCode::MalformedResponse,
                Some(json!({"key": key, "reason": reason})),
            ),
            SummaryError::ParentCycle { key, chain } => (
                ErrorCode::ParentCycle,
                Some(json!({"key": key, "chain": chain})),
            ),
            SummaryError::Upstream {
                operation, class, ..
            } => {
                let code = match class {
                    ErrorClass::Transient => ErrorCode::UpstreamTransient,
                    ErrorClass::Permanent => ErrorCode::UpstreamPermanent,
                };
                (code, Some(json!({"operation": operation})))
            }
            SummaryError::Summarizer { class, .. } => (
                ErrorCode::SummarizerFailed,
                Some(json!({"class": class.as_str()})),
            ),
            SummaryError::PromptTooLarge { tokens, limit } => (
                ErrorCode::PromptTooLarge,
                Some(json!({"tokens": tokens, "limit": limit})),
            ),
            SummaryError::SnapshotParse { line, .. } => {
                (ErrorCode::SnapshotParseError, Some(json!({"line": line})))
            }
            SummaryError::Validation { field, reason } => (
                ErrorCode::ValidationFailed,
                Some(json!({"field": field, "reason": reason})),
            ),
            SummaryError::Config(_) => (ErrorCode::ConfigError, None),
            SummaryError::Io(_) => (ErrorCode::IoError, None),
            SummaryError::Json(_) => (ErrorCode::JsonError, None),
            SummaryError::Yaml(_) => (ErrorCode::YamlError, None),
            SummaryError::Other(_) => (ErrorCode::InternalError, None),
        }
    }
}
