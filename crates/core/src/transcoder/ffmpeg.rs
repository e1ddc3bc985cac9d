//! FFmpeg-based MP3 transcoder.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use tracing::warn;

use super::config::{TranscodeMode, TranscoderConfig};
use super::error::TranscodeError;
use super::traits::{AudioTranscoder, TranscodeRequest};

const FFMPEG_BIN: &str = "ffmpeg";

/// Transcoder shelling out to ffmpeg with `-progress pipe:1`.
pub struct FfmpegTranscoder {
    config: TranscoderConfig,
    permits: Arc<Semaphore>,
}

impl FfmpegTranscoder {
    pub fn new(config: TranscoderConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self { config, permits }
    }

    /// Build the full ffmpeg argument list for one request.
    fn build_args(&self, request: &TranscodeRequest) -> Vec<String> {
        let mut args = vec!["-y".to_string()];
        if !request.start.is_empty() {
            args.extend(["-ss".to_string(), request.start.clone()]);
        }
        if !request.end.is_empty() {
            args.extend(["-to".to_string(), request.end.clone()]);
        }
        args.extend([
            "-i".to_string(),
            request.input_path.clone(),
            "-vn".to_string(),
            "-acodec".to_string(),
            "libmp3lame".to_string(),
        ]);
        match self.config.mode {
            TranscodeMode::Cbr => {
                // Request-supplied quality wins over the configured bitrate.
                let bitrate = if request.quality.is_empty() {
                    self.config.cbr_bitrate.clone()
                } else {
                    format!("{}k", request.quality)
                };
                args.extend(["-b:a".to_string(), bitrate]);
            }
            TranscodeMode::Vbr => {
                args.extend(["-q:a".to_string(), self.config.vbr_quality.to_string()]);
            }
        }
        if self.config.threads > 0 {
            args.extend(["-threads".to_string(), self.config.threads.to_string()]);
        }
        args.extend([
            "-progress".to_string(),
            "pipe:1".to_string(),
            "-nostats".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            request.output_path.clone(),
        ]);
        args
    }
}

/// Translate an `out_time_ms=` value (microseconds, despite the name) into a
/// clamped integer percentage of `duration_seconds`.
fn percent_of(out_time_ms: f64, duration_seconds: i64) -> Option<u8> {
    if duration_seconds <= 0 {
        return None;
    }
    let pct = (out_time_ms / 1_000_000.0) / duration_seconds as f64 * 100.0;
    Some(pct.clamp(0.0, 100.0) as u8)
}

#[async_trait]
impl AudioTranscoder for FfmpegTranscoder {
    async fn convert(
        &self,
        request: TranscodeRequest,
        progress: mpsc::Sender<u8>,
    ) -> Result<(), TranscodeError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .expect("transcoder semaphore closed");

        let args = self.build_args(&request);
        let mut child = Command::new(FFMPEG_BIN)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TranscodeError::ToolNotFound {
                        tool: FFMPEG_BIN.to_string(),
                    }
                } else {
                    TranscodeError::Io(e)
                }
            })?;

        let stdout = child.stdout.take().expect("stdout piped");

        let run = async {
            let mut lines = BufReader::new(stdout).lines();
            let mut last_pct: i64 = -1;
            while let Ok(Some(line)) = lines.next_line().await {
                let Some(value) = line.strip_prefix("out_time_ms=") else {
                    continue;
                };
                let Ok(out_time_ms) = value.trim().parse::<f64>() else {
                    continue;
                };
                if let Some(pct) = percent_of(out_time_ms, request.duration_seconds) {
                    if i64::from(pct) != last_pct {
                        last_pct = i64::from(pct);
                        let _ = progress.try_send(pct);
                    }
                }
            }
            child.wait().await
        };

        let status = match timeout(self.config.max_timeout, run).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(output = %request.output_path, "transcode timed out, killing ffmpeg");
                let _ = child.kill().await;
                return Err(TranscodeError::Timeout {
                    timeout_secs: self.config.max_timeout.as_secs(),
                });
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(TranscodeError::ToolFailed {
                code: status.code(),
            })
        }
    }
}
