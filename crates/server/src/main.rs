use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audiomill_core::{
    load_config, spawn_janitor, validate_config, FetcherConfig, FfmpegTranscoder, MemoryStore,
    Orchestrator, RedisStore, SessionStore, TranscoderConfig, YtDlpFetcher,
};
use audiomill_server::api::create_router;
use audiomill_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("AUDIOMILL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("failed to load config from {config_path:?}"))?;
    validate_config(&config).context("configuration validation failed")?;

    // Prefer Redis when configured and reachable; otherwise run in-memory.
    let store: Arc<dyn SessionStore> = match &config.redis {
        Some(redis) => match RedisStore::new(&redis.addr, &redis.password, redis.db) {
            Ok(store) => match store.ping().await {
                Ok(()) => {
                    info!(addr = %redis.addr, "using redis session store");
                    Arc::new(store)
                }
                Err(e) => {
                    warn!(addr = %redis.addr, error = %e, "redis unreachable, using memory store");
                    Arc::new(MemoryStore::new())
                }
            },
            Err(e) => {
                warn!(error = %e, "redis setup failed, using memory store");
                Arc::new(MemoryStore::new())
            }
        },
        None => {
            info!("using in-memory session store");
            Arc::new(MemoryStore::new())
        }
    };

    let fetcher = Arc::new(YtDlpFetcher::new(FetcherConfig {
        oembed_endpoint: config.metadata.oembed_endpoint.clone(),
        duration_endpoint: config.metadata.duration_endpoint.clone(),
        tool_timeout: config.metadata_tool_timeout(),
        download_timeout: config.download_timeout(),
        max_concurrent: config.download.max_concurrent,
    }));
    let transcoder = Arc::new(FfmpegTranscoder::new(TranscoderConfig {
        mode: config.transcode.mode,
        cbr_bitrate: config.transcode.cbr_bitrate.clone(),
        vbr_quality: config.transcode.vbr_quality,
        threads: config.transcode.threads,
        min_timeout: std::time::Duration::from_secs(config.transcode.min_timeout_secs),
        max_timeout: config.transcode_max_timeout(),
        max_concurrent: config.transcode.max_concurrent,
    }));

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        store,
        fetcher,
        transcoder,
    ));
    orchestrator.start();
    let _janitor = spawn_janitor(config.storage.clone());

    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&orchestrator)));
    let app = create_router(state)
        .into_make_service_with_connect_info::<SocketAddr>();

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
