//! Transcoder trait seam.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::TranscodeError;

/// One encode request. `start`/`end` are `HH:MM:SS`/`MM:SS` strings as
/// validated upstream; empty means the whole file. `duration_seconds` scales
/// the encoder's time counter into a percentage.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub input_path: String,
    pub output_path: String,
    pub quality: String,
    pub start: String,
    pub end: String,
    pub duration_seconds: i64,
}

/// Encodes a downloaded source into an MP3.
#[async_trait]
pub trait AudioTranscoder: Send + Sync {
    /// Run one encode. Progress percentages are pushed on `progress`,
    /// emitted only when the value changes; the channel closes when the
    /// encode finishes either way.
    async fn convert(
        &self,
        request: TranscodeRequest,
        progress: mpsc::Sender<u8>,
    ) -> Result<(), TranscodeError>;
}
