//! Shared fake-runner helpers for the gateway integration tests.
//!
//! Fake runners are real axum servers bound to ephemeral ports, serving
//! canned Ollama-shaped responses and counting how often each endpoint
//! is hit.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use ollamux_core::{
    Identity, ModelProfile, ModelProfileStore, OwnerOrPublicAccess, Role, RunnerConfig,
    RunnerRegistry,
};
use ollamux_proxy::{GatewaySettings, GatewayState, StaticIdentity};

/// Per-endpoint hit counters for one fake runner.
#[derive(Clone, Default)]
pub struct RunnerStats {
    pub tags_calls: Arc<AtomicUsize>,
    pub ps_calls: Arc<AtomicUsize>,
    pub version_calls: Arc<AtomicUsize>,
    pub chat_calls: Arc<AtomicUsize>,
    pub pull_calls: Arc<AtomicUsize>,
}

impl RunnerStats {
    pub fn tags(&self) -> usize {
        self.tags_calls.load(Ordering::SeqCst)
    }
    pub fn chats(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct RunnerFixture {
    tags: Value,
    ps: Value,
    version: Value,
    stats: RunnerStats,
}

pub struct FakeRunner {
    pub base_url: String,
    pub stats: RunnerStats,
}

async fn tags_handler(State(fixture): State<RunnerFixture>) -> Json<Value> {
    fixture.stats.tags_calls.fetch_add(1, Ordering::SeqCst);
    Json(fixture.tags.clone())
}

async fn ps_handler(State(fixture): State<RunnerFixture>) -> Json<Value> {
    fixture.stats.ps_calls.fetch_add(1, Ordering::SeqCst);
    Json(fixture.ps.clone())
}

async fn version_handler(State(fixture): State<RunnerFixture>) -> Json<Value> {
    fixture.stats.version_calls.fetch_add(1, Ordering::SeqCst);
    Json(fixture.version.clone())
}

/// Echoes the forwarded payload back so tests can inspect exactly what
/// the gateway sent upstream.
async fn chat_handler(State(fixture): State<RunnerFixture>, body: Bytes) -> Json<Value> {
    fixture.stats.chat_calls.fetch_add(1, Ordering::SeqCst);
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    Json(json!({"forwarded": payload, "done": true}))
}

async fn pull_handler(State(fixture): State<RunnerFixture>, body: Bytes) -> Json<Value> {
    fixture.stats.pull_calls.fetch_add(1, Ordering::SeqCst);
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    Json(json!({"forwarded": payload, "status": "success"}))
}

/// Spawn a fake runner serving canned tag/ps/version responses.
pub async fn spawn_runner(tags: Value, ps: Value, version: Value) -> FakeRunner {
    let stats = RunnerStats::default();
    let fixture = RunnerFixture {
        tags,
        ps,
        version,
        stats: stats.clone(),
    };

    let app = Router::new()
        .route("/api/tags", get(tags_handler))
        .route("/api/ps", get(ps_handler))
        .route("/api/version", get(version_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/pull", post(pull_handler))
        .with_state(fixture);

    serve_app(app, stats).await
}

/// Spawn a fake runner from a bare model-name list; ps is empty.
pub async fn spawn_runner_with_models(models: &[&str], version: &str) -> FakeRunner {
    let tags = json!({
        "models": models
            .iter()
            .map(|name| json!({"model": name, "size": 1_000_000}))
            .collect::<Vec<_>>()
    });
    spawn_runner(tags, json!({"models": []}), json!({"version": version})).await
}

pub async fn serve_app(app: Router, stats: RunnerStats) -> FakeRunner {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    FakeRunner {
        base_url: format!("http://{addr}"),
        stats,
    }
}

/// Profile store backed by a plain map, for access-control tests.
pub struct MapProfileStore(pub HashMap<String, ModelProfile>);

#[async_trait]
impl ModelProfileStore for MapProfileStore {
    async fn get(&self, model_id: &str) -> Option<ModelProfile> {
        self.0.get(model_id).cloned()
    }
}

pub fn admin_identity() -> Identity {
    Identity::new("admin", "Gateway Admin", "admin@localhost", Role::Admin)
}

pub fn user_identity() -> Identity {
    Identity::new("u1", "Ada Lovelace", "ada@example.com", Role::User)
}

/// Gateway state over the given runner URLs with default collaborators.
pub fn test_state(
    base_urls: Vec<String>,
    configs: HashMap<String, RunnerConfig>,
    identity: Identity,
) -> GatewayState {
    test_state_with(
        base_urls,
        configs,
        GatewaySettings {
            cache_ttl_secs: 60,
            ..GatewaySettings::default()
        },
        Arc::new(MapProfileStore(HashMap::new())),
        identity,
    )
}

pub fn test_state_with(
    base_urls: Vec<String>,
    configs: HashMap<String, RunnerConfig>,
    settings: GatewaySettings,
    profiles: Arc<dyn ModelProfileStore>,
    identity: Identity,
) -> GatewayState {
    GatewayState::new(
        RunnerRegistry::new(base_urls, configs),
        settings,
        profiles,
        Arc::new(OwnerOrPublicAccess),
        Arc::new(StaticIdentity::new(identity)),
    )
    .unwrap()
}
