#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use hailango_api::auth::jwt::{generate_access_token, JwtConfig};
use hailango_api::config::ServerConfig;
use hailango_api::router::build_app_router;
use hailango_api::state::AppState;
use hailango_events::{Hub, HubConfig};
use hailango_pipeline::{
    InMemoryJobStore, JobService, JobStore, MediaBackend, SimulatedBackend, SimulationConfig,
};

/// Build a test `ServerConfig` with safe defaults.
///
/// The simulated backend steps every millisecond so jobs finish quickly on
/// the real clock.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 15,
        },
        hub: HubConfig::default(),
        simulation: SimulationConfig::default().with_step_delay(Duration::from_millis(1)),
    }
}

/// Everything a test needs to drive the app and inspect the engine.
#[derive(Clone)]
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    pub fn hub(&self) -> &Arc<Hub> {
        &self.state.hub
    }

    pub fn jobs(&self) -> &Arc<JobService> {
        &self.state.jobs
    }

    /// A valid bearer token for `user_id`.
    pub fn token_for(&self, user_id: Uuid) -> String {
        generate_access_token(user_id, &self.state.config.jwt).unwrap()
    }
}

/// Build the full application router with all middleware layers, backed by
/// a fresh hub, in-memory store and simulated backend.
pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config())
}

pub fn build_test_app_with(config: ServerConfig) -> TestApp {
    let hub = Arc::new(Hub::new(config.hub.clone()));
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let backend: Arc<dyn MediaBackend> =
        Arc::new(SimulatedBackend::new(config.simulation.clone()));
    let jobs = Arc::new(JobService::new(store, backend, Arc::clone(&hub)));

    let config = Arc::new(config);
    let state = AppState {
        config: Arc::clone(&config),
        hub,
        jobs,
    };
    let router = build_app_router(state.clone(), &config);

    TestApp { router, state }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, Body::empty()).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::GET, uri, Some(token), Body::empty()).await
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Response<Body> {
    send(
        app,
        Method::POST,
        uri,
        Some(token),
        Body::from(body.to_string()),
    )
    .await
}

async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Body,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert the status and return the JSON body.
pub async fn expect_json(response: Response<Body>, status: StatusCode) -> serde_json::Value {
    assert_eq!(response.status(), status);
    body_json(response).await
}
