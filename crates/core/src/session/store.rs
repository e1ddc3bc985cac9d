//! Session storage trait.

use async_trait::async_trait;
use thiserror::Error;

use super::types::{AssetState, ConversionSession};

/// Errors surfaced by session store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session already exists: {0}")]
    AlreadyExists(String),

    #[error("session not found: {0}")]
    NotFound(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// One entry of the shared asset cache, keyed by asset fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetEntry {
    pub source_path: String,
    pub state: AssetState,
}

/// Persistence required by the orchestration engine: sessions, the
/// URL → session map and the two dedup caches.
///
/// Implementations must be safe for concurrent use. Readers get value
/// copies; writers replace whole records (last writer wins). The persistent
/// backend applies a ~24h TTL to url/variant/asset entries; the in-memory
/// backend does not expire.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session. Fails with [`StoreError::AlreadyExists`] when
    /// the id is taken. Refreshes the stored `updated_at`.
    async fn create_session(&self, session: &ConversionSession) -> Result<(), StoreError>;

    /// Replace an existing session. Fails with [`StoreError::NotFound`] when
    /// absent. Refreshes the stored `updated_at`.
    async fn update_session(&self, session: &ConversionSession) -> Result<(), StoreError>;

    /// Fetch a copy of a session.
    async fn get_session(&self, id: &str) -> Result<ConversionSession, StoreError>;

    /// Remove a session and any URL mapping pointing at it.
    async fn delete_session(&self, id: &str) -> Result<(), StoreError>;

    /// Most recent session id seen for a URL, if any.
    async fn find_by_url(&self, url: &str) -> Result<Option<String>, StoreError>;

    /// Record the most recent session for a URL.
    async fn set_url_map(&self, url: &str, id: &str) -> Result<(), StoreError>;

    /// Record the output path for a completed variant.
    async fn set_variant(&self, variant_hash: &str, output_path: &str) -> Result<(), StoreError>;

    /// Look up a completed variant's output path.
    async fn get_variant(&self, variant_hash: &str) -> Result<Option<String>, StoreError>;

    /// Record the download state of a shared source asset.
    async fn set_asset(
        &self,
        asset_hash: &str,
        source_path: &str,
        state: AssetState,
    ) -> Result<(), StoreError>;

    /// Look up a shared source asset.
    async fn get_asset(&self, asset_hash: &str) -> Result<Option<AssetEntry>, StoreError>;
}
