//! Mock fetcher for testing.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use crate::fetcher::{FetchError, MediaFetcher, MediaMetadata};

/// Mock implementation of [`MediaFetcher`].
///
/// Controllable behavior for tests: scripted metadata, a fail-N-times
/// counter for retry tests, scripted progress sequences, and recorded
/// download URLs for assertions. Successful downloads write a small dummy
/// file so downstream code finds real bytes on disk.
pub struct MockFetcher {
    metadata: Arc<RwLock<MediaMetadata>>,
    metadata_fails: Arc<RwLock<bool>>,
    /// Downloads left to fail before succeeding.
    failures_remaining: Arc<AtomicU32>,
    progress_script: Arc<RwLock<Vec<u8>>>,
    download_delay: Arc<RwLock<Duration>>,
    downloads: Arc<RwLock<Vec<String>>>,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            metadata: Arc::new(RwLock::new(MediaMetadata {
                title: "Test Video".to_string(),
                thumbnail: "https://example.com/thumb.jpg".to_string(),
                duration_seconds: 180,
            })),
            metadata_fails: Arc::new(RwLock::new(false)),
            failures_remaining: Arc::new(AtomicU32::new(0)),
            progress_script: Arc::new(RwLock::new(vec![25, 50, 75, 100])),
            download_delay: Arc::new(RwLock::new(Duration::ZERO)),
            downloads: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn set_metadata(&self, metadata: MediaMetadata) {
        *self.metadata.write().await = metadata;
    }

    /// Make `fetch_metadata` fail until cleared.
    pub async fn set_metadata_fails(&self, fails: bool) {
        *self.metadata_fails.write().await = fails;
    }

    /// Fail the next `n` downloads, then succeed.
    pub fn fail_downloads(&self, n: u32) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    pub async fn set_progress_script(&self, script: Vec<u8>) {
        *self.progress_script.write().await = script;
    }

    pub async fn set_download_delay(&self, delay: Duration) {
        *self.download_delay.write().await = delay;
    }

    /// URLs passed to `download`, in call order.
    pub async fn recorded_downloads(&self) -> Vec<String> {
        self.downloads.read().await.clone()
    }

    pub async fn download_count(&self) -> usize {
        self.downloads.read().await.len()
    }
}

#[async_trait]
impl MediaFetcher for MockFetcher {
    async fn fetch_metadata(&self, _url: &str) -> Result<MediaMetadata, FetchError> {
        if *self.metadata_fails.read().await {
            return Err(FetchError::MetadataUnavailable {
                reason: "scripted failure".to_string(),
            });
        }
        Ok(self.metadata.read().await.clone())
    }

    async fn download(
        &self,
        url: &str,
        output_path: &Path,
        progress: mpsc::Sender<u8>,
    ) -> Result<(), FetchError> {
        self.downloads.write().await.push(url.to_string());

        let delay = *self.download_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(FetchError::ToolFailed { code: Some(1) });
        }

        for pct in self.progress_script.read().await.iter() {
            let _ = progress.send(*pct).await;
        }
        tokio::fs::write(output_path, b"mock source audio").await?;
        Ok(())
    }
}
