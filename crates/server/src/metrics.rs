//! Prometheus metrics for the HTTP surface.
//!
//! HTTP-level counters live here; pipeline metrics come from the core crate
//! and are pulled into the same registry.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "audiomill_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("audiomill_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "audiomill_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Requests refused by the limiters and gates.
pub static REQUESTS_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "audiomill_requests_rejected_total",
            "Requests rejected before reaching a handler",
        ),
        &["reason"], // "rate_limit", "per_ip_rate_limit", "api_key", "ip_allowlist"
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry
        .register(Box::new(REQUESTS_REJECTED.clone()))
        .unwrap();

    for metric in audiomill_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Normalize a path for metric labels (session ids become placeholders).
pub fn normalize_path(path: &str) -> String {
    let session_re = regex_lite::Regex::new(r"conv_[0-9a-fA-F]{32}").unwrap();
    let hash_re = regex_lite::Regex::new(r"[0-9a-fA-F]{40}").unwrap();
    let result = session_re.replace_all(path, "{id}");
    let result = hash_re.replace_all(&result, "{hash}");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_session_id() {
        let path = "/status/conv_0123456789abcdef0123456789abcdef";
        assert_eq!(normalize_path(path), "/status/{id}");
        let path = "/download/conv_0123456789abcdef0123456789abcdef.mp3";
        assert_eq!(normalize_path(path), "/download/{id}.mp3");
    }

    #[test]
    fn test_normalize_path_plain() {
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/prepare"), "/prepare");
    }

    #[test]
    fn test_encode_metrics_is_prometheus_text() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();
        let output = encode_metrics();
        assert!(output.contains("audiomill_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_includes_core_metrics() {
        audiomill_core::metrics::SESSIONS_CREATED.get();
        let output = encode_metrics();
        assert!(output.contains("audiomill_sessions_created_total"));
    }
}
