//! In-process test fixture: the full router wired to mock tools.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use audiomill_core::testing::{MockFetcher, MockTranscoder};
use audiomill_core::{Config, MemoryStore, Orchestrator, SessionStore};
use audiomill_server::api::create_router;
use audiomill_server::state::AppState;

/// Configuration for the test fixture.
#[derive(Clone)]
pub struct TestConfig {
    /// Start the worker pools. Leave off to keep jobs visibly queued.
    pub start_workers: bool,
    pub config: Config,
}

impl Default for TestConfig {
    fn default() -> Self {
        let mut config = Config::default();
        config.queue.worker_pool_size = 2;
        // Polling loops in tests would trip the default per-IP bucket.
        config.limits.per_ip_rps = 100_000.0;
        config.limits.per_ip_burst = 100_000;
        config.limits.requests_per_second = 100_000.0;
        config.limits.burst = 100_000;
        Self {
            start_workers: true,
            config,
        }
    }
}

impl TestConfig {
    pub fn workers_paused() -> Self {
        Self {
            start_workers: false,
            ..Self::default()
        }
    }
}

pub struct TestFixture {
    pub router: Router,
    pub orchestrator: Arc<Orchestrator>,
    pub fetcher: Arc<MockFetcher>,
    pub transcoder: Arc<MockTranscoder>,
    pub store: Arc<MemoryStore>,
    pub temp_dir: TempDir,
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub raw_body: Vec<u8>,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    pub async fn with_config(mut test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        test_config.config.storage.conversions_dir = temp_dir.path().to_path_buf();

        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(MockFetcher::new());
        let transcoder = Arc::new(MockTranscoder::new());

        let orchestrator = Arc::new(Orchestrator::new(
            test_config.config.clone(),
            Arc::clone(&store) as Arc<dyn SessionStore>,
            Arc::clone(&fetcher) as _,
            Arc::clone(&transcoder) as _,
        ));
        if test_config.start_workers {
            orchestrator.start();
        }

        let state = Arc::new(AppState::new(
            test_config.config,
            Arc::clone(&orchestrator),
        ));
        let router = create_router(state);

        Self {
            router,
            orchestrator,
            fetcher,
            transcoder,
            store,
            temp_dir,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, &[]).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), &[]).await
    }

    pub async fn post_with_headers(
        &self,
        path: &str,
        body: Value,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        self.request("POST", path, Some(body), headers).await
    }

    pub async fn get_with_headers(&self, path: &str, headers: &[(&str, &str)]) -> TestResponse {
        self.request("GET", path, None, headers).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None, &[]).await
    }

    /// Send raw bytes with an explicit content type (for malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request should not fail");

        let status = response.status();
        let headers = response.headers().clone();
        let raw_body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes()
            .to_vec();
        let body = if raw_body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&raw_body).unwrap_or(Value::Null)
        };
        TestResponse {
            status,
            headers,
            body,
            raw_body,
        }
    }

    /// Poll `/status/{id}` until the session reaches `status` or panic.
    pub async fn wait_for_status(&self, id: &str, status: &str) -> Value {
        for _ in 0..400 {
            let response = self.get(&format!("/status/{id}")).await;
            let current = response.body["status"].as_str().unwrap_or("").to_string();
            if current == status {
                return response.body;
            }
            if current == "failed" && status != "failed" {
                panic!("session failed unexpectedly: {}", response.body);
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
        panic!("timed out waiting for status {status}");
    }
}

/// Assert a response status with the body in the failure message.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "expected {:?}, got {:?}. Body: {}",
            $status, $response.status, $response.body
        );
    };
}
