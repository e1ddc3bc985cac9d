//! Request gates: rate limits, API key, IP allowlist, security headers and
//! HTTP metrics.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use audiomill_core::config::LimitsConfig;

use crate::metrics::{
    normalize_path, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION,
    REQUESTS_REJECTED,
};
use crate::state::AppState;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn reject(status: StatusCode, reason: &'static str, message: &str) -> Response {
    REQUESTS_REJECTED.with_label_values(&[reason]).inc();
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Token bucket refilled continuously at a fixed per-second rate. Starts
/// full so bursts up to `capacity` pass immediately.
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(burst: usize, per_second: f64) -> Self {
        let capacity = burst as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_rate: per_second,
            last_refill: Instant::now(),
        }
    }

    pub fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// Shared limiter state: one global bucket plus one bucket per client IP.
pub struct RateLimiters {
    global: Mutex<TokenBucket>,
    per_ip: Mutex<HashMap<IpAddr, TokenBucket>>,
    per_ip_rps: f64,
    per_ip_burst: usize,
}

impl RateLimiters {
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            global: Mutex::new(TokenBucket::new(limits.burst, limits.requests_per_second)),
            per_ip: Mutex::new(HashMap::new()),
            per_ip_rps: limits.per_ip_rps,
            per_ip_burst: limits.per_ip_burst,
        }
    }

    pub fn allow_global(&self) -> bool {
        self.global
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .try_acquire()
    }

    pub fn allow_ip(&self, ip: IpAddr) -> bool {
        let mut buckets = self
            .per_ip
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        buckets
            .entry(ip)
            .or_insert_with(|| TokenBucket::new(self.per_ip_burst, self.per_ip_rps))
            .try_acquire()
    }
}

/// Client IP for limiting purposes; in-process tests have no socket address,
/// so they fall back to localhost.
fn client_ip(request: &Request<Body>) -> IpAddr {
    request
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Records request duration, totals and the in-flight gauge.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();
    let response = next.run(request).await;
    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();
    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

/// Conservative security headers on every response.
pub async fn security_headers(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "X-XSS-Protection",
        HeaderValue::from_static("1; mode=block"),
    );
    response
}

/// Blocks clients outside the configured IP allowlist. An empty list admits
/// everyone.
pub async fn ip_allowlist(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let allowlist = &state.config().http.ip_allowlist;
    if !allowlist.is_empty() {
        let ip = client_ip(&request).to_string();
        if !allowlist.iter().any(|allowed| allowed.trim() == ip) {
            return reject(StatusCode::FORBIDDEN, "ip_allowlist", "ip not allowed");
        }
    }
    next.run(request).await
}

/// Global token-bucket limiter across all clients.
pub async fn global_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.rate_limiters().allow_global() {
        return reject(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limit",
            "rate limit exceeded",
        );
    }
    next.run(request).await
}

/// Per-client-IP token-bucket limiter.
pub async fn per_ip_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&request);
    if !state.rate_limiters().allow_ip(ip) {
        return reject(
            StatusCode::TOO_MANY_REQUESTS,
            "per_ip_rate_limit",
            "per-ip rate limit exceeded",
        );
    }
    next.run(request).await
}

/// API-key gate. Accepts `X-API-Key: <key>` or `Authorization: Bearer <key>`;
/// disabled unless `auth.require_api_key` is set.
pub async fn api_key_gate(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let auth = &state.config().auth;
    if !auth.require_api_key {
        return next.run(request).await;
    }

    let provided = extract_api_key(&request);
    let valid = provided
        .as_deref()
        .map(|key| {
            auth.api_keys
                .iter()
                .any(|expected| constant_time_eq(key.as_bytes(), expected.as_bytes()))
        })
        .unwrap_or(false);
    if !valid {
        return reject(StatusCode::UNAUTHORIZED, "api_key", "invalid api key");
    }
    next.run(request).await
}

fn extract_api_key(request: &Request<Body>) -> Option<String> {
    if let Some(value) = request.headers().get("x-api-key") {
        return value.to_str().ok().map(|v| v.to_string());
    }
    if let Some(value) = request.headers().get("authorization") {
        let value = value.to_str().ok()?;
        if let Some(key) = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer ")) {
            return Some(key.to_string());
        }
    }
    None
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_bucket_burst_then_empty() {
        let mut bucket = TokenBucket::new(3, 1.0);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn test_token_bucket_refills_over_time() {
        let mut bucket = TokenBucket::new(1, 1000.0);
        assert!(bucket.try_acquire());
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(bucket.try_acquire());
    }

    #[test]
    fn test_rate_limiters_track_ips_independently() {
        let limits = LimitsConfig {
            requests_per_second: 100.0,
            burst: 200,
            per_ip_rps: 0.0001,
            per_ip_burst: 1,
        };
        let limiters = RateLimiters::new(&limits);
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiters.allow_ip(a));
        assert!(!limiters.allow_ip(a));
        assert!(limiters.allow_ip(b));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"key", b"key"));
        assert!(!constant_time_eq(b"key", b"kex"));
        assert!(!constant_time_eq(b"key", b"ke"));
        assert!(constant_time_eq(b"", b""));
    }
}
