//! Error types for the fetcher module.

use thiserror::Error;

/// Errors from metadata lookup or source download.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The external downloader binary is not installed.
    #[error("downloader tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// The external tool exited non-zero.
    #[error("downloader exited with status {code:?}")]
    ToolFailed { code: Option<i32> },

    /// The invocation exceeded its deadline and was killed.
    #[error("download timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Neither the fast path nor the tool produced usable metadata.
    #[error("metadata unavailable: {reason}")]
    MetadataUnavailable { reason: String },

    /// HTTP error on the metadata fast path.
    #[error("metadata request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
