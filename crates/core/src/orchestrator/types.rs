//! Orchestrator error and result types.

use thiserror::Error;

use crate::session::{ConversionSession, SessionState, StoreError};

/// Errors surfaced to the HTTP layer. The mapping is part of the API
/// contract: validation errors are 400, missing sessions 404, a full queue
/// 503 and store failures 500.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unsupported url domain")]
    UnsupportedDomain,

    #[error("invalid start/end or clip too long")]
    InvalidClip,

    #[error("video exceeds the maximum allowed duration")]
    VideoTooLong,

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("queue full")]
    QueueFull,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of an accepted `convert` request.
#[derive(Debug, Clone)]
pub struct ConvertAccepted {
    pub session_id: String,
    pub state: SessionState,
    /// Live rank in the convert queue; 0 on a variant-cache hit.
    pub queue_position: usize,
    /// Whether the source was already downloaded when the job was enqueued.
    pub source_ready: bool,
}

/// Snapshot returned by `status`.
#[derive(Debug, Clone)]
pub struct StatusView {
    pub session: ConversionSession,
    /// Present once the session is completed and its output exists.
    pub download_url: Option<String>,
    /// Present while the session is queued for conversion.
    pub queue_position: Option<usize>,
}

/// Current depth of both job queues.
#[derive(Debug, Clone, Copy)]
pub struct QueueDepths {
    pub download: usize,
    pub convert: usize,
}

impl QueueDepths {
    pub fn total(&self) -> usize {
        self.download + self.convert
    }
}
