#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use imgq_api::config::{Backend, ServerConfig};
use imgq_api::notifications::{Notifier, NotifierConfig, NotifierHandle};
use imgq_api::router::build_app_router;
use imgq_api::state::AppState;
use imgq_api::ws::HeartbeatConfig;
use imgq_core::queue::{MemoryJobQueue, DEFAULT_MAX_RETRIES};
use imgq_core::result::RESULT_TTL;
use imgq_core::store::MemoryResultStore;
use imgq_events::CompletionBus;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Build a test `ServerConfig` on the memory backend with no in-process
/// workers, so tests decide when results appear.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        backend: Backend::Memory,
        database_url: None,
        heartbeat: HeartbeatConfig::default(),
        notifier: NotifierConfig::default(),
        job_max_retries: DEFAULT_MAX_RETRIES,
        job_retry_delay: Duration::ZERO,
        result_ttl: RESULT_TTL,
        retention_interval: Duration::from_secs(300),
        inprocess_workers: 0,
    }
}

/// The router plus handles on everything behind it.
pub struct TestApp {
    pub router: Router,
    pub queue: Arc<MemoryJobQueue>,
    pub results: Arc<MemoryResultStore>,
    pub bus: Arc<CompletionBus>,
    pub notifier: NotifierHandle,
    pub cancel: CancellationToken,
}

/// Build the full application router with all middleware layers.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack (CORS, request ID, timeout, tracing,
/// panic recovery) that production uses.
pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config())
}

pub fn build_test_app_with(config: ServerConfig) -> TestApp {
    let queue = Arc::new(MemoryJobQueue::new());
    let results = Arc::new(MemoryResultStore::new());
    let bus = Arc::new(CompletionBus::default());
    let cancel = CancellationToken::new();

    let (notifier, _task) = Notifier::spawn(
        results.clone(),
        bus.subscribe(),
        config.notifier.clone(),
        cancel.clone(),
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        queue: queue.clone(),
        results: results.clone(),
        notifier: notifier.clone(),
    };

    let router = build_app_router(state, &config).expect("test CORS origins are valid");

    TestApp {
        router,
        queue,
        results,
        bus,
        notifier,
        cancel,
    }
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
