use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transcoder::TranscodeMode;

/// Root configuration. Every section has defaults, so an empty file (or no
/// file at all) yields a runnable service.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Listen address.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Worker pools and the two job queues.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Consumers per pool (one pool per stage).
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Capacity of each priority queue; overflow returns 503.
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    /// Automatic retries per job before it is marked failed.
    #[serde(default = "default_max_job_retries")]
    pub max_job_retries: u32,
    /// `/ready` sheds with 503 once combined queue depth exceeds this.
    /// 0 disables shedding.
    #[serde(default)]
    pub shed_queue_threshold: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            capacity: default_queue_capacity(),
            max_job_retries: default_max_job_retries(),
            shed_queue_threshold: 0,
        }
    }
}

fn default_worker_pool_size() -> usize {
    20
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_max_job_retries() -> u32 {
    3
}

/// Token-bucket request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    #[serde(default = "default_rps")]
    pub requests_per_second: f64,
    #[serde(default = "default_burst")]
    pub burst: usize,
    #[serde(default = "default_per_ip_rps")]
    pub per_ip_rps: f64,
    #[serde(default = "default_per_ip_burst")]
    pub per_ip_burst: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rps(),
            burst: default_burst(),
            per_ip_rps: default_per_ip_rps(),
            per_ip_burst: default_per_ip_burst(),
        }
    }
}

fn default_rps() -> f64 {
    100.0
}

fn default_burst() -> usize {
    200
}

fn default_per_ip_rps() -> f64 {
    10.0
}

fn default_per_ip_burst() -> usize {
    20
}

/// Optional Redis-backed session store. When absent or unreachable the
/// service falls back to the in-memory store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    pub addr: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub db: i64,
}

/// Metadata fast-path endpoints and the tool fallback timeout.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetadataConfig {
    #[serde(default = "default_oembed_endpoint")]
    pub oembed_endpoint: String,
    #[serde(default)]
    pub duration_endpoint: String,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            oembed_endpoint: default_oembed_endpoint(),
            duration_endpoint: String::new(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_oembed_endpoint() -> String {
    "https://www.youtube.com/oembed".to_string()
}

fn default_tool_timeout_secs() -> u64 {
    90
}

/// Source download limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    #[serde(default = "default_download_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_download_timeout_secs(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_download_timeout_secs() -> u64 {
    30 * 60
}

fn default_max_concurrent() -> usize {
    20
}

/// Encoder settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeConfig {
    #[serde(default = "default_mode")]
    pub mode: TranscodeMode,
    #[serde(default = "default_cbr_bitrate")]
    pub cbr_bitrate: String,
    #[serde(default = "default_vbr_quality")]
    pub vbr_quality: u32,
    /// 0 lets the encoder decide.
    #[serde(default)]
    pub threads: u32,
    #[serde(default = "default_min_transcode_secs")]
    pub min_timeout_secs: u64,
    #[serde(default = "default_max_transcode_secs")]
    pub max_timeout_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            cbr_bitrate: default_cbr_bitrate(),
            vbr_quality: default_vbr_quality(),
            threads: 0,
            min_timeout_secs: default_min_transcode_secs(),
            max_timeout_secs: default_max_transcode_secs(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_mode() -> TranscodeMode {
    TranscodeMode::Cbr
}

fn default_cbr_bitrate() -> String {
    "192k".to_string()
}

fn default_vbr_quality() -> u32 {
    5
}

fn default_min_transcode_secs() -> u64 {
    15 * 60
}

fn default_max_transcode_secs() -> u64 {
    60 * 60
}

/// Artifact directory and sweep TTLs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root for `streams/` (sources) and `outputs/` (MP3s).
    #[serde(default = "default_conversions_dir")]
    pub conversions_dir: PathBuf,
    #[serde(default = "default_unconverted_ttl_secs")]
    pub unconverted_ttl_secs: u64,
    #[serde(default = "default_converted_ttl_secs")]
    pub converted_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            conversions_dir: default_conversions_dir(),
            unconverted_ttl_secs: default_unconverted_ttl_secs(),
            converted_ttl_secs: default_converted_ttl_secs(),
        }
    }
}

impl StorageConfig {
    pub fn streams_dir(&self) -> PathBuf {
        self.conversions_dir.join("streams")
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.conversions_dir.join("outputs")
    }
}

fn default_conversions_dir() -> PathBuf {
    PathBuf::from("/tmp/conversions")
}

fn default_unconverted_ttl_secs() -> u64 {
    5 * 60
}

fn default_converted_ttl_secs() -> u64 {
    10 * 60
}

/// API-key gate.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub require_api_key: bool,
    #[serde(default)]
    pub api_keys: Vec<String>,
}

/// CORS origins and the optional client-IP allowlist.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Empty list allows every client IP.
    #[serde(default)]
    pub ip_allowlist: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            ip_allowlist: Vec::new(),
        }
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

/// Request validation limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidationConfig {
    #[serde(default = "default_allowed_domains")]
    pub allowed_domains: Vec<String>,
    /// Cap on `end - start` (or `total - start` with no end). 0 disables.
    #[serde(default = "default_max_clip_seconds")]
    pub max_clip_seconds: i64,
    /// Videos longer than this are rejected at prepare. 0 disables.
    #[serde(default = "default_max_video_duration_seconds")]
    pub max_video_duration_seconds: i64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            allowed_domains: default_allowed_domains(),
            max_clip_seconds: default_max_clip_seconds(),
            max_video_duration_seconds: default_max_video_duration_seconds(),
        }
    }
}

fn default_allowed_domains() -> Vec<String> {
    vec!["youtube.com".to_string(), "youtu.be".to_string()]
}

fn default_max_clip_seconds() -> i64 {
    15 * 60
}

fn default_max_video_duration_seconds() -> i64 {
    40 * 60
}

impl Config {
    pub fn metadata_tool_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata.tool_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download.timeout_secs)
    }

    pub fn transcode_max_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode.max_timeout_secs)
    }
}
