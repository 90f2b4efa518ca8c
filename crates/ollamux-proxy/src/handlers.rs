//! Gateway route handlers.
//!
//! Handlers authenticate through the identity port, delegate to the
//! aggregation/routing/proxy modules, and map `GatewayError` onto
//! Ollama-style `{"error": "..."}` bodies with the taxonomy's status
//! codes.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::{Value, json};
use tracing::debug;

use ollamux_core::{GatewayError, TagsResponse};

use crate::catalog;
use crate::chat;
use crate::models::{GatewayConfigForm, GatewayConfigPayload, VerifyConnectionForm};
use crate::state::GatewayState;
use crate::version;

/// Axum-facing wrapper for the gateway error taxonomy.
pub struct HttpError(pub GatewayError);

impl From<GatewayError> for HttpError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

// ── GET / ──────────────────────────────────────────────────────────────

/// Liveness probe.
pub(crate) async fn get_status() -> impl IntoResponse {
    Json(json!({"status": true}))
}

// ── POST /verify ───────────────────────────────────────────────────────

/// Probe a candidate runner URL before adding it to the registry.
pub(crate) async fn verify_connection(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(form): Json<VerifyConnectionForm>,
) -> Result<Json<Value>, HttpError> {
    let user = state.auth.admin_user(&headers).await?;
    let url = form.url.trim_end_matches('/');
    debug!(url, "verifying runner connection");

    let value = state
        .transport
        .fetch_json_strict(&format!("{url}/api/version"), form.key.as_deref(), Some(&user))
        .await?;
    Ok(Json(value))
}

// ── GET /config, POST /config/update ───────────────────────────────────

pub(crate) async fn get_config(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Result<Json<GatewayConfigPayload>, HttpError> {
    state.auth.admin_user(&headers).await?;
    let registry = state.registry.read().await;
    Ok(Json(GatewayConfigPayload {
        enabled: state.settings.read().await.enabled,
        base_urls: registry.base_urls.clone(),
        configs: registry.configs.clone(),
    }))
}

/// Replace the registry wholesale. Stale per-runner config keys are
/// pruned, cached catalogs are dropped.
pub(crate) async fn update_config(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(form): Json<GatewayConfigForm>,
) -> Result<Json<GatewayConfigPayload>, HttpError> {
    state.auth.admin_user(&headers).await?;

    if let Some(enabled) = form.enabled {
        state.settings.write().await.enabled = enabled;
    }
    {
        let mut registry = state.registry.write().await;
        registry.update(form.base_urls, form.configs);
    }
    state.cache.clear().await;

    let registry = state.registry.read().await;
    Ok(Json(GatewayConfigPayload {
        enabled: state.settings.read().await.enabled,
        base_urls: registry.base_urls.clone(),
        configs: registry.configs.clone(),
    }))
}

// ── GET /api/tags[/{index}] ────────────────────────────────────────────

pub(crate) async fn get_tags(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let user = state.auth.verified_user(&headers).await?;
    let catalog = catalog::get_all_models(&state, Some(&user)).await;

    let bypass = state.settings.read().await.bypass_access_control;
    if user.is_admin() || bypass {
        return Ok(Json(catalog.as_ref().clone()).into_response());
    }
    let visible = catalog::filter_models_for(&state, catalog.models.clone(), &user).await;
    Ok(Json(json!({"models": visible})).into_response())
}

pub(crate) async fn get_tags_for(
    State(state): State<GatewayState>,
    Path(index): Path<usize>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let user = state.auth.verified_user(&headers).await?;
    let raw = catalog::get_tags_for_index(&state, index, Some(&user)).await?;

    let bypass = state.settings.read().await.bypass_access_control;
    if user.is_admin() || bypass {
        return Ok(Json(raw).into_response());
    }
    let listing: TagsResponse = serde_json::from_value(raw).unwrap_or_default();
    let visible = catalog::filter_models_for(&state, listing.models, &user).await;
    Ok(Json(json!({"models": visible})).into_response())
}

// ── GET /api/ps ────────────────────────────────────────────────────────

/// Models currently loaded into runner memory, merged across runners.
pub(crate) async fn get_ps(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Result<Json<Value>, HttpError> {
    let user = state.auth.admin_user(&headers).await?;
    let models = catalog::get_loaded_models(&state, Some(&user)).await;
    Ok(Json(json!({"models": models})))
}

// ── GET /api/version[/{index}] ─────────────────────────────────────────

pub(crate) async fn get_version(
    State(state): State<GatewayState>,
) -> Result<Json<Value>, HttpError> {
    Ok(Json(version::get_lowest_version(&state).await?))
}

pub(crate) async fn get_version_for(
    State(state): State<GatewayState>,
    Path(index): Path<usize>,
) -> Result<Json<Value>, HttpError> {
    if !state.settings.read().await.enabled {
        return Ok(Json(json!({"version": false})));
    }
    Ok(Json(version::get_version_for_index(&state, index).await?))
}

// ── POST /api/pull[/{index}] ───────────────────────────────────────────

pub(crate) async fn pull(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError> {
    pull_with_index(state, headers, 0, body).await
}

pub(crate) async fn pull_for(
    State(state): State<GatewayState>,
    Path(index): Path<usize>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError> {
    pull_with_index(state, headers, index, body).await
}

async fn pull_with_index(
    state: GatewayState,
    headers: HeaderMap,
    index: usize,
    body: Bytes,
) -> Result<Response, HttpError> {
    let user = state.auth.admin_user(&headers).await?;
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::Validation(e.to_string()))?;
    let response = chat::pull_model(&state, payload, index, &user).await?;
    Ok(response.into_response())
}

// ── POST /api/chat[/{index}] ───────────────────────────────────────────

pub(crate) async fn chat(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError> {
    chat_with_index(state, headers, None, body).await
}

pub(crate) async fn chat_for(
    State(state): State<GatewayState>,
    Path(index): Path<usize>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError> {
    chat_with_index(state, headers, Some(index), body).await
}

async fn chat_with_index(
    state: GatewayState,
    headers: HeaderMap,
    index: Option<usize>,
    body: Bytes,
) -> Result<Response, HttpError> {
    let user = state.auth.verified_user(&headers).await?;
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::Validation(e.to_string()))?;

    // A fresh process has no model index until the first catalog read.
    if state.snapshot_index().await.is_empty() {
        let _ = catalog::get_all_models(&state, Some(&user)).await;
    }

    let response = chat::generate_chat_completion(&state, payload, index, &user, false).await?;
    Ok(response.into_response())
}
