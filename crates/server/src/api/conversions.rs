//! Conversion endpoints: prepare, convert, status, download, delete.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use audiomill_core::{MetaLite, OrchestratorError, SessionState};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PrepareBody {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ConvertBody {
    #[serde(default)]
    pub conversion_id: String,
    #[serde(default)]
    pub quality: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
}

#[derive(Debug, Serialize)]
pub struct PrepareResponse {
    pub conversion_id: String,
    pub status: String,
    pub metadata: MetaLite,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    pub conversion_id: String,
    pub status: String,
    pub queue_position: usize,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub conversion_id: String,
    pub status: String,
    pub download_progress: u8,
    pub conversion_progress: u8,
    pub download_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn error_response(err: OrchestratorError) -> ApiError {
    let status = match &err {
        OrchestratorError::InvalidRequest(_)
        | OrchestratorError::UnsupportedDomain
        | OrchestratorError::InvalidClip
        | OrchestratorError::VideoTooLong => StatusCode::BAD_REQUEST,
        OrchestratorError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        OrchestratorError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
        OrchestratorError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

fn not_found(message: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
}

/// POST /prepare
pub async fn prepare(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PrepareBody>,
) -> Result<(StatusCode, Json<PrepareResponse>), ApiError> {
    if body.url.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "invalid request".to_string(),
            }),
        ));
    }
    let session = state
        .orchestrator()
        .prepare(&body.url)
        .await
        .map_err(error_response)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(PrepareResponse {
            conversion_id: session.id,
            status: session.state.to_string(),
            metadata: session.meta,
            message: "Metadata fetched successfully. Stream is downloading in background."
                .to_string(),
        }),
    ))
}

/// POST /convert
pub async fn convert(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ConvertBody>,
) -> Result<(StatusCode, Json<ConvertResponse>), ApiError> {
    let api_key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let accepted = state
        .orchestrator()
        .convert(
            &body.conversion_id,
            &body.quality,
            &body.start_time,
            &body.end_time,
            api_key,
        )
        .await
        .map_err(error_response)?;

    let message = if accepted.state == SessionState::Completed {
        "Reused existing converted output."
    } else if accepted.source_ready {
        "Conversion request accepted. Starting conversion shortly."
    } else {
        "Conversion request accepted. Waiting for download to finish."
    };
    Ok((
        StatusCode::ACCEPTED,
        Json(ConvertResponse {
            conversion_id: accepted.session_id,
            status: accepted.state.to_string(),
            queue_position: accepted.queue_position,
            message: message.to_string(),
        }),
    ))
}

/// GET /status/{id}
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let view = state
        .orchestrator()
        .status(&id)
        .await
        .map_err(error_response)?;
    let session = view.session;
    Ok(Json(StatusResponse {
        conversion_id: session.id,
        status: session.state.to_string(),
        download_progress: session.download_progress,
        conversion_progress: session.conversion_progress,
        download_url: view.download_url.unwrap_or_default(),
        queue_position: view.queue_position,
        error: (!session.error.is_empty()).then_some(session.error),
    }))
}

/// GET /download/{id}.mp3 — Range-capable MP3 delivery.
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
    request: Request<Body>,
) -> Result<Response, ApiError> {
    let Some(id) = file.strip_suffix(".mp3") else {
        return Err(not_found("not found"));
    };
    let view = state
        .orchestrator()
        .status(id)
        .await
        .map_err(|_| not_found("not found"))?;
    let session = view.session;
    if session.state != SessionState::Completed || session.output_path.is_empty() {
        return Err(not_found("file not ready"));
    }
    if !std::path::Path::new(&session.output_path).exists() {
        return Err(not_found("missing"));
    }

    let served = match ServeFile::new(&session.output_path).oneshot(request).await {
        Ok(response) => response,
        Err(infallible) => match infallible {},
    };
    let mut response = served.map(Body::new);
    let filename = safe_filename(&session.meta.title);
    let disposition = format!("attachment; filename=\"{filename}.mp3\"");
    response.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("audio/mpeg"),
    );
    Ok(response)
}

/// DELETE /delete/{id}
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<DeleteResponse> {
    if let Err(e) = state.orchestrator().delete(&id).await {
        tracing::warn!(session_id = %id, error = %e, "delete failed");
    }
    Json(DeleteResponse {
        status: "deleted".to_string(),
        message: "Conversion data removed successfully.".to_string(),
    })
}

fn safe_filename(title: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '"' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned
    }
}
