pub mod config;
pub mod fetcher;
pub mod janitor;
pub mod metrics;
pub mod orchestrator;
pub mod queue;
pub mod session;
pub mod testing;
pub mod transcoder;
pub mod urls;

pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use fetcher::{FetchError, FetcherConfig, MediaFetcher, MediaMetadata, YtDlpFetcher};
pub use janitor::spawn_janitor;
pub use orchestrator::{ConvertAccepted, Orchestrator, OrchestratorError, QueueDepths, StatusView};
pub use queue::{Job, JobKind, JobQueue, WorkerPool};
pub use session::{
    AssetEntry, AssetState, ConversionSession, MemoryStore, MetaLite, RedisStore, SessionState,
    SessionStore, StoreError,
};
pub use transcoder::{
    AudioTranscoder, FfmpegTranscoder, TranscodeError, TranscodeMode, TranscodeRequest,
    TranscoderConfig,
};
