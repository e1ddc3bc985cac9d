use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, AllowOrigin, CorsLayer};

use super::{conversions, handlers, middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(state.as_ref());

    Router::new()
        // Conversion API
        .route("/prepare", post(conversions::prepare))
        .route("/convert", post(conversions::convert))
        .route("/status/{id}", get(conversions::status))
        .route("/download/{file}", get(conversions::download_file))
        .route("/delete/{id}", delete(conversions::delete))
        // Operations
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/metrics", get(handlers::metrics_json))
        .route("/metrics/prom", get(handlers::metrics_prom))
        .route("/stats", get(handlers::stats))
        .route("/selftest", get(handlers::selftest))
        // Innermost gate first: api key, then limiters, then allowlist.
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::api_key_gate,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::per_ip_rate_limit,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::global_rate_limit,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::ip_allowlist,
        ))
        .layer(axum_middleware::from_fn(middleware::security_headers))
        .layer(axum_middleware::from_fn(middleware::metrics_middleware))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins = &state.config().http.allowed_origins;
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([header::CONTENT_LENGTH, header::CONTENT_RANGE]);
    if origins.iter().any(|origin| origin == "*") {
        layer.allow_origin(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(parsed))
    }
}
