//! Fetcher configuration.

use std::time::Duration;

/// Runtime knobs for the yt-dlp based fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// oEmbed-style endpoint queried for title/thumbnail on the fast path.
    pub oembed_endpoint: String,
    /// Duration oracle POSTed on the fast path.
    pub duration_endpoint: String,
    /// Cap on the `--dump-json` metadata fallback.
    pub tool_timeout: Duration,
    /// Cap on a full source download.
    pub download_timeout: Duration,
    /// Permits for concurrent downloader invocations.
    pub max_concurrent: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            oembed_endpoint: "https://www.youtube.com/oembed".to_string(),
            duration_endpoint: String::new(),
            tool_timeout: Duration::from_secs(90),
            download_timeout: Duration::from_secs(30 * 60),
            max_concurrent: 20,
        }
    }
}
