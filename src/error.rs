//! Error kinds for the extraction pipeline.
//!
//! Every failure that callers need to tell apart has its own variant and its
//! own process exit code. Key collisions during flattening are not errors;
//! they are reported as warnings and the last value wins.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result alias for the library.
pub type Result<T, E = ExtractError> = std::result::Result<T, E>;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("{role} file '{}' not found", .path.display())]
    InputNotFound { role: &'static str, path: PathBuf },

    #[error("'{tool}' is not installed or not in PATH")]
    ToolNotAvailable { tool: String },

    #[error("'{tool}' exited with {}: {}", exit_label(.code), stderr_label(.stderr))]
    ToolInvocationFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("'{tool}' did not finish within {}s", .timeout.as_secs())]
    ToolTimeout { tool: String, timeout: Duration },

    #[error("'{tool}' was interrupted")]
    Interrupted { tool: String },

    #[error("no variables payload found in tool output: {reason}")]
    NoPayloadFound { reason: String },

    #[error("failed to parse payload near '{fragment}': {message}")]
    ParseError { fragment: String, message: String },

    #[error("value of '{key}' is a {kind}, which cannot be rendered as {format}")]
    UnsupportedValueType {
        key: String,
        kind: &'static str,
        format: &'static str,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    /// Process exit code for this error kind.
    ///
    /// Code 2 is left to clap for usage errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExtractError::InputNotFound { .. } => 10,
            ExtractError::ToolNotAvailable { .. } => 11,
            ExtractError::ToolInvocationFailed { .. } => 12,
            ExtractError::ToolTimeout { .. } => 13,
            ExtractError::NoPayloadFound { .. } => 14,
            ExtractError::ParseError { .. } => 15,
            ExtractError::UnsupportedValueType { .. } => 16,
            ExtractError::Interrupted { .. } => 130,
            ExtractError::InvalidConfig(_) | ExtractError::Io(_) => 1,
        }
    }

    /// Build a `ParseError`, keeping only a short excerpt of the input.
    pub(crate) fn parse(fragment: &str, message: impl Into<String>) -> Self {
        ExtractError::ParseError {
            fragment: excerpt(fragment),
            message: message.into(),
        }
    }
}

const EXCERPT_LEN: usize = 40;

fn excerpt(text: &str) -> String {
    let text = text.trim_start();
    match text.char_indices().nth(EXCERPT_LEN) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (killed by signal)".to_string(),
    }
}

fn stderr_label(stderr: &str) -> &str {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        "Unknown error"
    } else {
        trimmed
    }
}
