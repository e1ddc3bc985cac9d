//! Error types for the transcoder module.

use thiserror::Error;

/// Errors from an MP3 encode.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The encoder binary is not installed.
    #[error("transcoder tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// The encoder exited non-zero.
    #[error("transcoder exited with status {code:?}")]
    ToolFailed { code: Option<i32> },

    /// The encode exceeded its deadline and was killed.
    #[error("transcode timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The source file is missing or empty.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
