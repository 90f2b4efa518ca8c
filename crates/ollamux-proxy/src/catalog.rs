//! Catalog aggregation: concurrent multi-runner discovery, per-runner
//! transforms, registry-order merge, and the short-TTL cache.
//!
//! Fan-out is index-aligned: disabled runners contribute an immediate
//! `None` slot instead of being skipped, so merged `urls` always refer to
//! real registry positions. Merge order is registry order, never response
//! arrival order, so results are deterministic for fixed runner output.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use ollamux_core::{
    Catalog, GatewayError, Identity, LoadedModel, ModelRecord, PsResponse, RunnerEndpoint,
    TagsResponse, catalog::apply_runner_transforms, catalog::merge_model_lists,
};

use crate::state::GatewayState;

const ALL_MODELS_KEY: &str = "all_models";

fn cache_key(identity: Option<&Identity>) -> String {
    identity.map_or_else(
        || ALL_MODELS_KEY.to_string(),
        |user| format!("{ALL_MODELS_KEY}_{}", user.id),
    )
}

/// Merged catalog across all runners, cached per requester identity with
/// a short TTL. A miss refreshes from every enabled runner concurrently;
/// concurrent misses both refresh (last write wins).
pub async fn get_all_models(state: &GatewayState, identity: Option<&Identity>) -> Arc<Catalog> {
    let key = cache_key(identity);
    if let Some(cached) = state.cache.get(&key).await {
        return cached;
    }

    let catalog = Arc::new(refresh_catalog(state, identity).await);
    state.cache.put(key, Arc::clone(&catalog)).await;
    catalog
}

async fn refresh_catalog(state: &GatewayState, identity: Option<&Identity>) -> Catalog {
    info!("refreshing model catalog");
    if !state.settings.read().await.enabled {
        state.swap_index(HashMap::new()).await;
        return Catalog::default();
    }

    let endpoints = state.registry.read().await.endpoints();
    let responses = fan_out_tags(state, &endpoints, identity).await;
    let mut models = merge_model_lists(responses);

    // Annotate expiry from the loaded listing; its failure modes are all
    // soft, so the merged catalog is returned either way.
    let loaded = get_loaded_models(state, identity).await;
    let expires: HashMap<String, i64> = loaded
        .iter()
        .filter_map(|entry| entry.expires_epoch().map(|ts| (entry.model.clone(), ts)))
        .collect();
    for model in &mut models {
        if let Some(ts) = expires.get(&model.model) {
            model.expires_at = Some(*ts);
        }
    }

    let catalog = Catalog::new(models);
    state.swap_index(catalog.index_map()).await;
    catalog
}

/// Concurrently fetch and transform every runner's tag listing. The
/// result is index-aligned with the registry.
async fn fan_out_tags(
    state: &GatewayState,
    endpoints: &[RunnerEndpoint],
    identity: Option<&Identity>,
) -> Vec<Option<Vec<ModelRecord>>> {
    let tasks = endpoints.iter().map(|endpoint| {
        let transport = state.transport.clone();
        let url = format!("{}/api/tags", endpoint.base_url);
        let config = endpoint.config.clone();
        let identity = identity.cloned();
        async move {
            if !config.enabled {
                return None;
            }
            let response = transport
                .fetch_json(&url, config.api_key.as_deref(), identity.as_ref())
                .await?;
            let tags: TagsResponse = match serde_json::from_value(response) {
                Ok(tags) => tags,
                Err(e) => {
                    warn!(url, error = %e, "unexpected tag listing shape");
                    return None;
                }
            };
            let mut models = tags.models;
            apply_runner_transforms(&mut models, &config);
            Some(models)
        }
    });

    join_all(tasks).await
}

/// Merged "currently loaded" listing across all runners. Same fan-out
/// pattern and prefixing as the catalog, no cache, no tag/label rewrite.
pub async fn get_loaded_models(
    state: &GatewayState,
    identity: Option<&Identity>,
) -> Vec<LoadedModel> {
    if !state.settings.read().await.enabled {
        return Vec::new();
    }

    let endpoints = state.registry.read().await.endpoints();
    let tasks = endpoints.iter().map(|endpoint| {
        let transport = state.transport.clone();
        let url = format!("{}/api/ps", endpoint.base_url);
        let config = endpoint.config.clone();
        let identity = identity.cloned();
        async move {
            if !config.enabled {
                return None;
            }
            let response = transport
                .fetch_json(&url, config.api_key.as_deref(), identity.as_ref())
                .await?;
            let ps: PsResponse = match serde_json::from_value(response) {
                Ok(ps) => ps,
                Err(e) => {
                    warn!(url, error = %e, "unexpected loaded listing shape");
                    return None;
                }
            };
            let mut models = ps.models;
            if let Some(prefix) = &config.prefix {
                for model in &mut models {
                    model.model = format!("{prefix}.{}", model.model);
                }
            }
            Some(models)
        }
    });

    let responses = join_all(tasks).await;
    merge_model_lists(responses)
}

/// Direct, uncached single-runner tag listing, bypassing merge and cache.
///
/// # Errors
///
/// `Validation` for an out-of-range index; upstream errors per the strict
/// fetch path.
pub async fn get_tags_for_index(
    state: &GatewayState,
    index: usize,
    identity: Option<&Identity>,
) -> Result<Value, GatewayError> {
    let (url, config) = {
        let registry = state.registry.read().await;
        let url = registry
            .url_for(index)
            .ok_or_else(|| GatewayError::Validation(format!("invalid runner index {index}")))?
            .to_string();
        let config = registry.config_for(index, &url);
        (url, config)
    };

    state
        .transport
        .fetch_json_strict(
            &format!("{url}/api/tags"),
            config.api_key.as_deref(),
            identity,
        )
        .await
}

/// Keep only the models the identity may read: owned profiles and those
/// the access policy grants. Models with no registered profile are
/// dropped for non-privileged identities.
pub async fn filter_models_for(
    state: &GatewayState,
    models: Vec<ModelRecord>,
    identity: &Identity,
) -> Vec<ModelRecord> {
    let mut visible = Vec::new();
    for model in models {
        let Some(profile) = state.profiles.get(&model.model).await else {
            debug!(model = %model.model, "no profile registered, hidden from non-admin");
            continue;
        };
        if identity.id == profile.owner_id || state.access.can_read(identity, &profile).await {
            visible.push(model);
        }
    }
    visible
}
