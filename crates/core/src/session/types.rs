//! Session model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client-visible lifecycle of a conversion session.
///
/// The serialized strings are part of the API contract and must not change:
/// clients poll `/status/{id}` and branch on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Preparing,
    FetchingMetadata,
    Created,
    Downloading,
    Downloaded,
    /// Queued for conversion, waiting for a worker (or for the download).
    #[serde(rename = "initializing")]
    Queued,
    Converting,
    Completed,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Preparing => "preparing",
            SessionState::FetchingMetadata => "fetching_metadata",
            SessionState::Created => "created",
            SessionState::Downloading => "downloading",
            SessionState::Downloaded => "downloaded",
            SessionState::Queued => "initializing",
            SessionState::Converting => "converting",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a shared source asset in the dedup cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetState {
    Preparing,
    Downloaded,
    Failed,
}

/// Lightweight metadata shown to the client right after `prepare`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaLite {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub thumbnail: String,
}

/// One conversion session, created per `prepare` call.
///
/// Sessions are treated as last-writer-wins at field granularity: workers
/// and the orchestrator each hold their own copy and write the whole record
/// back through the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionSession {
    #[serde(rename = "conversion_id")]
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub asset_hash: String,
    #[serde(default)]
    pub variant_hash: String,
    #[serde(rename = "status")]
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub source_path: String,
    #[serde(default)]
    pub output_path: String,
    #[serde(default)]
    pub quality: String,
    #[serde(default)]
    pub download_progress: u8,
    #[serde(default)]
    pub conversion_progress: u8,
    #[serde(rename = "metadata", default)]
    pub meta: MetaLite,
    #[serde(default)]
    pub error: String,
}

impl ConversionSession {
    /// Create a fresh session in `preparing`.
    pub fn new(url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_session_id(),
            url: url.into(),
            asset_hash: String::new(),
            variant_hash: String::new(),
            state: SessionState::Preparing,
            created_at: now,
            updated_at: now,
            source_path: String::new(),
            output_path: String::new(),
            quality: String::new(),
            download_progress: 0,
            conversion_progress: 0,
            meta: MetaLite::default(),
            error: String::new(),
        }
    }
}

fn new_session_id() -> String {
    format!("conv_{}", Uuid::new_v4().simple())
}
