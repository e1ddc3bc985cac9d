//! Fetcher trait seam.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::FetchError;

/// Lightweight metadata returned by [`MediaFetcher::fetch_metadata`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaMetadata {
    pub title: String,
    pub thumbnail: String,
    pub duration_seconds: i64,
}

/// Acquires remote media: metadata first (cheap, synchronous from the
/// client's point of view), then the audio source in the background.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Resolve title, thumbnail and duration for a video URL.
    async fn fetch_metadata(&self, url: &str) -> Result<MediaMetadata, FetchError>;

    /// Download the best audio stream of `url` to `output_path`.
    ///
    /// Integer progress percentages are pushed on `progress`; delivery is
    /// monotonically non-decreasing for one invocation. The channel closes
    /// when the download finishes either way.
    async fn download(
        &self,
        url: &str,
        output_path: &Path,
        progress: mpsc::Sender<u8>,
    ) -> Result<(), FetchError>;
}
