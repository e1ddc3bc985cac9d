//! Transcoder configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bitrate strategy for the MP3 encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TranscodeMode {
    Cbr,
    Vbr,
}

/// Runtime knobs for the ffmpeg transcoder.
#[derive(Debug, Clone)]
pub struct TranscoderConfig {
    pub mode: TranscodeMode,
    /// CBR bitrate like `"192k"`, used when the request carries no quality.
    pub cbr_bitrate: String,
    /// LAME VBR quality; lower is better.
    pub vbr_quality: u32,
    /// Encoder thread count; 0 lets the tool decide.
    pub threads: u32,
    /// Lower bound kept for operator tuning; the hard cap is `max_timeout`.
    pub min_timeout: Duration,
    pub max_timeout: Duration,
    /// Permits for concurrent encoder invocations.
    pub max_concurrent: usize,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            mode: TranscodeMode::Cbr,
            cbr_bitrate: "192k".to_string(),
            vbr_quality: 5,
            threads: 0,
            min_timeout: Duration::from_secs(15 * 60),
            max_timeout: Duration::from_secs(60 * 60),
            max_concurrent: 20,
        }
    }
}
