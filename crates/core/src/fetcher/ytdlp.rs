//! yt-dlp backed fetcher.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::config::FetcherConfig;
use super::error::FetchError;
use super::traits::{MediaFetcher, MediaMetadata};

const YTDLP_BIN: &str = "yt-dlp";

/// Strictly audio-only; never falls back to a video format.
const AUDIO_FORMAT: &str = "bestaudio[ext=m4a]/bestaudio[ext=webm]/bestaudio";

/// yt-dlp prints `[download]  42.3% of ...` on both streams depending on
/// version and flags; accept either.
static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[download\]\s+(\d{1,3})(?:\.\d+)?%").unwrap());

/// Deadline for the HTTP metadata fast path. Intentionally snappy: `prepare`
/// blocks the client on this.
const FAST_PATH_TIMEOUT: Duration = Duration::from_secs(5);

/// Fetcher shelling out to yt-dlp, with an HTTP fast path for metadata.
pub struct YtDlpFetcher {
    config: FetcherConfig,
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

#[derive(serde::Deserialize)]
struct OEmbedPayload {
    #[serde(default)]
    title: String,
    #[serde(default)]
    thumbnail_url: String,
}

#[derive(serde::Deserialize)]
struct DurationPayload {
    #[serde(default)]
    duration: i64,
}

impl YtDlpFetcher {
    pub fn new(config: FetcherConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FAST_PATH_TIMEOUT)
            .build()
            .expect("reqwest client");
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            config,
            client,
            permits,
        }
    }

    async fn fetch_oembed(&self, video_url: &str) -> Result<(String, String), FetchError> {
        if self.config.oembed_endpoint.is_empty() {
            return Err(FetchError::MetadataUnavailable {
                reason: "oembed endpoint not configured".to_string(),
            });
        }
        let payload: OEmbedPayload = self
            .client
            .get(&self.config.oembed_endpoint)
            .query(&[("url", video_url), ("format", "json")])
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok((payload.title, payload.thumbnail_url))
    }

    async fn fetch_duration(&self, video_url: &str) -> Result<i64, FetchError> {
        if self.config.duration_endpoint.is_empty() {
            return Err(FetchError::MetadataUnavailable {
                reason: "duration endpoint not configured".to_string(),
            });
        }
        let payload: DurationPayload = self
            .client
            .post(&self.config.duration_endpoint)
            .json(&serde_json::json!({ "url": video_url }))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if payload.duration > 0 {
            Ok(payload.duration)
        } else {
            Err(FetchError::MetadataUnavailable {
                reason: "duration oracle returned no duration".to_string(),
            })
        }
    }

    /// Metadata fallback: `yt-dlp --dump-json --no-playlist`.
    async fn probe_with_tool(&self, video_url: &str) -> Result<MediaMetadata, FetchError> {
        let run = Command::new(YTDLP_BIN)
            .args(["--dump-json", "--no-playlist", video_url])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match timeout(self.config.tool_timeout, run).await {
            Ok(result) => result.map_err(map_spawn_error)?,
            Err(_) => {
                return Err(FetchError::Timeout {
                    timeout_secs: self.config.tool_timeout.as_secs(),
                })
            }
        };
        if !output.status.success() {
            return Err(FetchError::ToolFailed {
                code: output.status.code(),
            });
        }

        let value: serde_json::Value =
            serde_json::from_slice(&output.stdout).map_err(|e| FetchError::MetadataUnavailable {
                reason: format!("unparseable yt-dlp output: {e}"),
            })?;
        Ok(MediaMetadata {
            title: value
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            thumbnail: value
                .get("thumbnail")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            duration_seconds: value.get("duration").map(duration_from_json).unwrap_or(0),
        })
    }
}

/// yt-dlp reports duration as a number or a numeric string; fractional
/// seconds are truncated at the decimal point.
fn duration_from_json(value: &serde_json::Value) -> i64 {
    match value {
        serde_json::Value::Number(n) => n.as_f64().map(|f| f.trunc() as i64).unwrap_or(0),
        serde_json::Value::String(s) => s
            .split('.')
            .next()
            .and_then(|whole| whole.trim().parse::<i64>().ok())
            .unwrap_or(0),
        _ => 0,
    }
}

fn map_spawn_error(e: std::io::Error) -> FetchError {
    if e.kind() == std::io::ErrorKind::NotFound {
        FetchError::ToolNotFound {
            tool: YTDLP_BIN.to_string(),
        }
    } else {
        FetchError::Io(e)
    }
}

fn parse_percent(line: &str) -> Option<u8> {
    let caps = PERCENT_RE.captures(line)?;
    let pct: u32 = caps.get(1)?.as_str().parse().ok()?;
    Some(pct.min(100) as u8)
}

/// Scan one output stream for progress lines. `last` is shared between the
/// stdout and stderr readers so delivery stays monotonic across both.
async fn read_progress<R>(stream: R, last: Arc<AtomicI64>, progress: mpsc::Sender<u8>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(pct) = parse_percent(&line) {
            let prev = last.fetch_max(pct as i64, Ordering::SeqCst);
            if i64::from(pct) > prev {
                let _ = progress.try_send(pct);
            }
        }
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch_metadata(&self, url: &str) -> Result<MediaMetadata, FetchError> {
        // Both HTTP calls race concurrently under the fast-path deadline.
        let (oembed, duration) = tokio::join!(self.fetch_oembed(url), self.fetch_duration(url));

        let (title, thumbnail) = match oembed {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, "oembed fast path failed");
                (String::new(), String::new())
            }
        };
        let duration_seconds = match duration {
            Ok(d) => d,
            Err(e) => {
                debug!(error = %e, "duration fast path failed");
                0
            }
        };

        if !title.is_empty() || !thumbnail.is_empty() || duration_seconds > 0 {
            return Ok(MediaMetadata {
                title,
                thumbnail,
                duration_seconds,
            });
        }

        self.probe_with_tool(url).await
    }

    async fn download(
        &self,
        url: &str,
        output_path: &Path,
        progress: mpsc::Sender<u8>,
    ) -> Result<(), FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .expect("fetcher semaphore closed");

        let mut child = Command::new(YTDLP_BIN)
            .arg("-f")
            .arg(AUDIO_FORMAT)
            .arg("-o")
            .arg(output_path)
            .args(["--no-playlist", "--newline"])
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(map_spawn_error)?;

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        // Progress appears on either stream; a shared high-water mark keeps
        // the delivered sequence monotonic regardless of interleaving.
        let last = Arc::new(AtomicI64::new(-1));
        let out_reader = tokio::spawn(read_progress(
            stdout,
            Arc::clone(&last),
            progress.clone(),
        ));
        let err_reader = tokio::spawn(read_progress(stderr, Arc::clone(&last), progress));

        let status = match timeout(self.config.download_timeout, child.wait()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(url, "download timed out, killing yt-dlp");
                let _ = child.kill().await;
                return Err(FetchError::Timeout {
                    timeout_secs: self.config.download_timeout.as_secs(),
                });
            }
        };
        let _ = out_reader.await;
        let _ = err_reader.await;

        if status.success() {
            Ok(())
        } else {
            Err(FetchError::ToolFailed {
                code: status.code(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_percent_accepts_integral_and_fractional() {
        assert_eq!(parse_percent("[download]  42.3% of 3.4MiB"), Some(42));
        assert_eq!(parse_percent("[download] 100% of 3.4MiB in 00:02"), Some(100));
        assert_eq!(parse_percent("[download]   0.0% of ~3.4MiB"), Some(0));
    }

    #[test]
    fn test_parse_percent_ignores_unrelated_lines() {
        assert_eq!(parse_percent("[info] abc: Downloading webpage"), None);
        assert_eq!(parse_percent("42%"), None);
        assert_eq!(parse_percent(""), None);
    }

    #[test]
    fn test_duration_from_json_forms() {
        assert_eq!(duration_from_json(&serde_json::json!(213)), 213);
        assert_eq!(duration_from_json(&serde_json::json!(213.7)), 213);
        assert_eq!(duration_from_json(&serde_json::json!("213.7")), 213);
        assert_eq!(duration_from_json(&serde_json::json!("213")), 213);
        assert_eq!(duration_from_json(&serde_json::json!(null)), 0);
        assert_eq!(duration_from_json(&serde_json::json!("n/a")), 0);
    }

    #[tokio::test]
    async fn test_read_progress_is_monotonic_across_streams() {
        let (tx, mut rx) = mpsc::channel(32);
        let last = Arc::new(AtomicI64::new(-1));

        // Interleaved streams where stderr lags behind stdout.
        let stdout: &[u8] = b"[download]  10.0% of x\n[download]  50.0% of x\n";
        let stderr: &[u8] = b"[download]  30.0% of x\n[download]  20.0% of x\n[download]  80.0% of x\n";

        read_progress(stdout, Arc::clone(&last), tx.clone()).await;
        read_progress(stderr, Arc::clone(&last), tx).await;

        let mut seen = Vec::new();
        while let Some(p) = rx.recv().await {
            seen.push(p);
        }
        assert_eq!(seen, vec![10, 50, 80]);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }
}
