//! The language model collaborator.
//!
//! [`Summarizer`] turns a prompt into summary text. [`CommandSummarizer`]
//! delegates to any external command that reads a prompt on stdin and writes
//! the completion to stdout; [`EchoSummarizer`] is a deterministic stand-in
//! for dry runs.

use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{debug, trace};

use crate::error::{ErrorClass, Result, SummaryError};
use crate::util::{RetryPolicy, with_retry};

/// `sysexits.h` EX_TEMPFAIL: the command asks to be tried again later.
const EXIT_TEMPFAIL: i32 = 75;

/// Rough characters-per-token ratio used for estimates.
const CHARS_PER_TOKEN: usize = 4;

/// Generates text from a prompt.
pub trait Summarizer: Send + Sync {
    /// Complete `prompt`, returning the generated text.
    ///
    /// # Errors
    ///
    /// `Summarizer` with a transient or permanent class.
    fn complete(&self, prompt: &str) -> Result<String>;

    /// Number of tokens in `text`.
    ///
    /// # Errors
    ///
    /// `PromptTooLarge` when the text exceeds what can be counted or sent.
    fn count_tokens(&self, text: &str) -> Result<usize>;
}

/// Estimate tokens, failing above `limit`.
///
/// # Errors
///
/// `PromptTooLarge` when the estimate exceeds `limit`.
pub fn estimate_tokens(text: &str, limit: usize) -> Result<usize> {
    let tokens = text.chars().count().div_ceil(CHARS_PER_TOKEN);
    if tokens > limit {
        return Err(SummaryError::PromptTooLarge { tokens, limit });
    }
    Ok(tokens)
}

/// Runs a shell command per prompt.
#[derive(Debug, Clone)]
pub struct CommandSummarizer {
    command: String,
    max_prompt_tokens: usize,
    retry: RetryPolicy,
}

impl CommandSummarizer {
    #[must_use]
    pub fn new(command: impl Into<String>, max_prompt_tokens: usize, retry: RetryPolicy) -> Self {
        Self {
            command: command.into(),
            max_prompt_tokens,
            retry,
        }
    }

    fn run_once(&self, prompt: &str) -> Result<String> {
        let mut child = Command::new("sh")
            .args(["-c", &self.command])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SummaryError::Summarizer {
                class: ErrorClass::Permanent,
                message: format!("cannot start `{}`: {e}", self.command),
            })?;

        // Feed stdin from another thread so a chatty command cannot deadlock us
        let writer = child.stdin.take().map(|mut stdin| {
            let prompt = prompt.to_string();
            std::thread::spawn(move || stdin.write_all(prompt.as_bytes()))
        });

        let output = child.wait_with_output()?;
        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    trace!("Summarizer closed stdin early");
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    return Err(SummaryError::Summarizer {
                        class: ErrorClass::Permanent,
                        message: "stdin writer panicked".to_string(),
                    });
                }
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let class = match output.status.code() {
                Some(EXIT_TEMPFAIL) | None => ErrorClass::Transient,
                Some(_) => ErrorClass::Permanent,
            };
            return Err(SummaryError::Summarizer {
                class,
                message: format!(
                    "`{}` exited with {}: {}",
                    self.command,
                    output.status,
                    stderr.trim()
                ),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(SummaryError::Summarizer {
                class: ErrorClass::Permanent,
                message: format!("`{}` produced no output", self.command),
            });
        }
        Ok(text)
    }
}

impl Summarizer for CommandSummarizer {
    fn complete(&self, prompt: &str) -> Result<String> {
        debug!(command = %self.command, prompt_chars = prompt.len(), "Invoking summarizer");
        with_retry(&self.retry, "summarize", || self.run_once(prompt))
    }

    fn count_tokens(&self, text: &str) -> Result<usize> {
        estimate_tokens(text, self.max_prompt_tokens)
    }
}

/// Deterministic summarizer: the prompt's first content line and its size.
#[derive(Debug, Clone)]
pub struct EchoSummarizer {
    max_prompt_tokens: usize,
}

impl EchoSummarizer {
    #[must_use]
    pub const fn new(max_prompt_tokens: usize) -> Self {
        Self { max_prompt_tokens }
    }
}

impl Default for EchoSummarizer {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

impl Summarizer for EchoSummarizer {
    fn complete(&self, prompt: &str) -> Result<String> {
        let title = prompt
            .lines()
            .find_map(|line| line.strip_prefix("Title: "))
            .unwrap_or("untitled");
        let words = prompt.split_whitespace().count();
        Ok(format!("Summary of {title} ({words} words of context)."))
    }

    fn count_tokens(&self, text: &str) -> Result<usize> {
        estimate_tokens(text, self.max_prompt_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            multiplier: 1.0,
            max_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens("", 10).unwrap(), 0);
        assert_eq!(estimate_tokens("abcde", 10).unwrap(), 2);
        let err = estimate_tokens(&"x".repeat(100), 10).unwrap_err();
        assert!(matches!(err, SummaryError::PromptTooLarge { tokens: 25, limit: 10 }));
    }

    #[test]
    fn test_echo_summarizer_uses_title() {
        let summarizer = EchoSummarizer::default();
        let text = summarizer
            .complete("You are a PM.\nTitle: ABC-1 - Ship it\nStatus: Open")
            .unwrap();
        assert!(text.starts_with("Summary of ABC-1 - Ship it"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_summarizer_pipes_prompt() {
        let summarizer = CommandSummarizer::new("tr a-z A-Z", 1000, fast_retry());
        assert_eq!(summarizer.complete("hello world\n").unwrap(), "HELLO WORLD");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_summarizer_failure_classes() {
        let summarizer = CommandSummarizer::new("cat >/dev/null; exit 3", 1000, fast_retry());
        let err = summarizer.complete("x").unwrap_err();
        assert_eq!(err.class(), ErrorClass::Permanent);

        let summarizer = CommandSummarizer::new("cat >/dev/null; exit 75", 1000, fast_retry());
        let err = summarizer.complete("x").unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_summarizer_empty_output_is_error() {
        let summarizer = CommandSummarizer::new("cat >/dev/null", 1000, fast_retry());
        assert!(summarizer.complete("x").is_err());
    }
}
