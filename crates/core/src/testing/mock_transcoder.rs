//! Mock transcoder for testing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use crate::transcoder::{AudioTranscoder, TranscodeError, TranscodeRequest};

/// A recorded transcode for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedTranscode {
    pub request: TranscodeRequest,
    pub success: bool,
}

/// Mock implementation of [`AudioTranscoder`]. Successful conversions write
/// a small dummy MP3 so `/download` has bytes to serve.
pub struct MockTranscoder {
    failures_remaining: Arc<AtomicU32>,
    progress_script: Arc<RwLock<Vec<u8>>>,
    convert_delay: Arc<RwLock<Duration>>,
    recorded: Arc<RwLock<Vec<RecordedTranscode>>>,
}

impl Default for MockTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTranscoder {
    pub fn new() -> Self {
        Self {
            failures_remaining: Arc::new(AtomicU32::new(0)),
            progress_script: Arc::new(RwLock::new(vec![20, 40, 60, 80, 100])),
            convert_delay: Arc::new(RwLock::new(Duration::ZERO)),
            recorded: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Fail the next `n` conversions, then succeed.
    pub fn fail_conversions(&self, n: u32) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    pub async fn set_progress_script(&self, script: Vec<u8>) {
        *self.progress_script.write().await = script;
    }

    pub async fn set_convert_delay(&self, delay: Duration) {
        *self.convert_delay.write().await = delay;
    }

    pub async fn recorded_transcodes(&self) -> Vec<RecordedTranscode> {
        self.recorded.read().await.clone()
    }

    pub async fn transcode_count(&self) -> usize {
        self.recorded.read().await.len()
    }
}

#[async_trait]
impl AudioTranscoder for MockTranscoder {
    async fn convert(
        &self,
        request: TranscodeRequest,
        progress: mpsc::Sender<u8>,
    ) -> Result<(), TranscodeError> {
        let delay = *self.convert_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            self.recorded.write().await.push(RecordedTranscode {
                request,
                success: false,
            });
            return Err(TranscodeError::ToolFailed { code: Some(1) });
        }

        for pct in self.progress_script.read().await.iter() {
            let _ = progress.send(*pct).await;
        }
        tokio::fs::write(&request.output_path, b"mock mp3 bytes").await?;
        self.recorded.write().await.push(RecordedTranscode {
            request,
            success: true,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(out: &std::path::Path) -> TranscodeRequest {
        TranscodeRequest {
            input_path: "/tmp/in.source".to_string(),
            output_path: out.to_string_lossy().into_owned(),
            quality: "128".to_string(),
            start: String::new(),
            end: String::new(),
            duration_seconds: 60,
        }
    }

    #[tokio::test]
    async fn test_records_failures_and_successes() {
        let transcoder = MockTranscoder::new();
        transcoder.fail_conversions(1);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a.mp3");

        let (tx, _rx) = mpsc::channel(16);
        assert!(transcoder.convert(request(&out), tx.clone()).await.is_err());
        assert!(transcoder.convert(request(&out), tx).await.is_ok());
        assert!(out.exists());

        let recorded = transcoder.recorded_transcodes().await;
        assert_eq!(recorded.len(), 2);
        assert!(!recorded[0].success);
        assert!(recorded[1].success);
    }
}
