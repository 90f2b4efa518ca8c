//! Chat-completion and pull proxying.
//!
//! The chat pipeline: strip request metadata, validate, consult the model
//! profile (alias substitution, stored params, system prompt, access
//! check), normalize the name, resolve a runner, strip that runner's
//! prefix back off, and forward — streamed as NDJSON or buffered,
//! depending on the request's own `stream` flag.

use serde_json::Value;
use tracing::{debug, info};

use ollamux_core::{GatewayError, Identity};

use crate::client::{PostOptions, ProxiedResponse};
use crate::models::ChatCompletionForm;
use crate::payload;
use crate::routing::{normalize_model_name, resolve_runner};
use crate::state::GatewayState;

const NDJSON: &str = "application/x-ndjson";

/// Forbidden responses deliberately mirror the not-found message so
/// non-privileged callers cannot probe which models exist.
fn forbidden() -> GatewayError {
    GatewayError::Forbidden("model not found".to_string())
}

/// Proxy a chat completion to the runner serving the requested model.
///
/// # Errors
///
/// `Validation` for malformed bodies, `Forbidden` when the identity may
/// not use the model, `ModelNotFound` when no runner serves it, plus the
/// transport taxonomy for upstream failures.
pub async fn generate_chat_completion(
    state: &GatewayState,
    mut body: Value,
    pinned: Option<usize>,
    identity: &Identity,
    bypass_access: bool,
) -> Result<ProxiedResponse, GatewayError> {
    let bypass_access = bypass_access || state.settings.read().await.bypass_access_control;

    let payload_obj = body
        .as_object_mut()
        .ok_or_else(|| GatewayError::Validation("request body must be a JSON object".into()))?;

    // `metadata` is out-of-band context (chat id), never forwarded.
    let metadata = payload_obj.remove("metadata");
    let chat_id = metadata
        .as_ref()
        .and_then(|meta| meta.get("chat_id"))
        .and_then(Value::as_str)
        .map(ToString::to_string);

    let form: ChatCompletionForm = serde_json::from_value(body.clone())
        .map_err(|e| GatewayError::Validation(e.to_string()))?;
    form.validate()?;
    let stream = form.is_streaming();
    let model_id = form.model;

    if let Some(profile) = state.profiles.get(&model_id).await {
        if let Some(base) = &profile.base_model_id {
            debug!(model = %model_id, base, "substituting base model alias");
            body["model"] = Value::String(base.clone());
        }
        if !profile.params.is_empty() {
            payload::apply_model_params(&profile.params, &mut body);
        }
        if let Some(system) = &profile.system_prompt {
            payload::apply_system_prompt(system, &mut body);
        }
        if !bypass_access
            && !identity.is_admin()
            && identity.id != profile.owner_id
            && !state.access.can_read(identity, &profile).await
        {
            return Err(forbidden());
        }
    } else if !bypass_access && !identity.is_admin() {
        return Err(forbidden());
    }

    let requested = body
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or(&model_id);
    let normalized = normalize_model_name(requested);
    body["model"] = Value::String(normalized.clone());

    let (base_url, index) = resolve_runner(state, &normalized, pinned).await?;
    let config = {
        let registry = state.registry.read().await;
        registry.config_for(index, &base_url)
    };

    // Runners see their native model name, not the gateway-visible alias.
    if let Some(prefix) = &config.prefix {
        let native = normalized.replacen(&format!("{prefix}."), "", 1);
        body["model"] = Value::String(native);
    }

    info!(model = %normalized, index, stream, "proxying chat completion");
    state
        .transport
        .post_stream(
            &format!("{base_url}/api/chat"),
            &body,
            PostOptions {
                api_key: config.api_key.as_deref(),
                identity: Some(identity),
                chat_id: chat_id.as_deref(),
                content_type: Some(NDJSON),
                stream,
            },
        )
        .await
}

/// Forward a model pull to exactly one runner, always buffered.
///
/// `insecure: true` is injected: the gateway does not pin certificates
/// for pulls, runners decide their own transport trust.
///
/// # Errors
///
/// `Validation` for non-object bodies or an out-of-range index, plus the
/// transport taxonomy for upstream failures.
pub async fn pull_model(
    state: &GatewayState,
    mut body: Value,
    index: usize,
    identity: &Identity,
) -> Result<ProxiedResponse, GatewayError> {
    let payload_obj = body
        .as_object_mut()
        .ok_or_else(|| GatewayError::Validation("request body must be a JSON object".into()))?;

    // Ollama clients send either `model` or the legacy `name`.
    if !payload_obj.contains_key("model")
        && let Some(name) = payload_obj.get("name").cloned()
    {
        payload_obj.insert("model".to_string(), name);
    }
    payload_obj.insert("insecure".to_string(), Value::Bool(true));

    let (url, config) = {
        let registry = state.registry.read().await;
        let url = registry
            .url_for(index)
            .ok_or_else(|| GatewayError::Validation(format!("invalid runner index {index}")))?
            .to_string();
        let config = registry.config_for(index, &url);
        (url, config)
    };

    info!(index, url = %url, "proxying model pull");
    state
        .transport
        .post_stream(
            &format!("{url}/api/pull"),
            &body,
            PostOptions {
                api_key: config.api_key.as_deref(),
                identity: Some(identity),
                chat_id: None,
                content_type: None,
                stream: false,
            },
        )
        .await
}
