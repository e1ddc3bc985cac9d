//! Operational endpoints: health, readiness, metrics, stats, selftest.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use audiomill_core::metrics as core_metrics;

use crate::metrics::encode_metrics;
use crate::state::AppState;

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let depths = state.orchestrator().queue_depths();
    Json(json!({
        "status": "healthy",
        "active_jobs": core_metrics::JOBS_ACTIVE.get(),
        "queued_jobs": depths.total(),
        "completed_jobs": core_metrics::success_count(),
        "failed_jobs": core_metrics::failure_count(),
        "workers": state.config().queue.worker_pool_size,
        "uptime_seconds": state.uptime_seconds(),
    }))
}

/// GET /ready — sheds with 503 once combined queue depth crosses the
/// configured threshold, steering load balancers elsewhere.
pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let threshold = state.config().queue.shed_queue_threshold;
    if threshold > 0 {
        let queued = state.orchestrator().queue_depths().total();
        if queued > threshold {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": "shedding: too many queued jobs"})),
            );
        }
    }
    (StatusCode::OK, Json(json!({"status": "ready"})))
}

/// GET /metrics — JSON summary for dashboards and scripts.
pub async fn metrics_json(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = state.config();
    let depths = state.orchestrator().queue_depths();
    Json(json!({
        "active_jobs": core_metrics::JOBS_ACTIVE.get(),
        "queued_jobs": depths.total(),
        "completed_jobs": core_metrics::success_count(),
        "failed_jobs": core_metrics::failure_count(),
        "workers": config.queue.worker_pool_size,
        "queue_capacity": config.queue.capacity,
        "rate_limit": config.limits.requests_per_second,
        "uptime_seconds": state.uptime_seconds(),
        "success_rate": core_metrics::success_rate(),
    }))
}

/// GET /metrics/prom — Prometheus text exposition.
pub async fn metrics_prom() -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}

/// GET /stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    let depths = state.orchestrator().queue_depths();
    Json(json!({
        "queue_download_len": depths.download,
        "queue_convert_len": depths.convert,
    }))
}

/// GET /selftest — probe the external tools this service shells out to.
pub async fn selftest() -> Json<Value> {
    let tools = vec![
        probe_tool("ffmpeg", &["-version"]).await,
        probe_tool("yt-dlp", &["--version"]).await,
    ];
    Json(json!({ "tools": tools }))
}

async fn probe_tool(name: &str, args: &[&str]) -> Value {
    match tokio::process::Command::new(name).args(args).output().await {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let version = stdout.lines().next().unwrap_or("").trim().to_string();
            json!({"name": name, "version": version})
        }
        Ok(output) => json!({
            "name": name,
            "error": format!("exit status {:?}", output.status.code()),
        }),
        Err(e) => json!({"name": name, "error": e.to_string()}),
    }
}
