//! Cross-runner version reconciliation.

use futures_util::future::join_all;
use serde_json::{Value, json};

use ollamux_core::{GatewayError, version};

use crate::state::GatewayState;

/// Lowest version across all enabled runners, as a conservative
/// capability floor. Unreachable runners are skipped; when none answer
/// the gateway cannot claim any version at all.
///
/// # Errors
///
/// `ServiceUnavailable` when every runner is unreachable.
pub async fn get_lowest_version(state: &GatewayState) -> Result<Value, GatewayError> {
    if !state.settings.read().await.enabled {
        return Ok(json!({"version": false}));
    }

    let endpoints = state.registry.read().await.endpoints();
    let tasks = endpoints
        .iter()
        .filter(|endpoint| endpoint.config.enabled)
        .map(|endpoint| {
            let transport = state.transport.clone();
            let url = format!("{}/api/version", endpoint.base_url);
            let api_key = endpoint.config.api_key.clone();
            async move { transport.fetch_json(&url, api_key.as_deref(), None).await }
        });

    let responses = join_all(tasks).await;
    let versions: Vec<String> = responses
        .into_iter()
        .flatten()
        .filter_map(|response| {
            response
                .get("version")
                .and_then(Value::as_str)
                .map(ToString::to_string)
        })
        .collect();

    version::lowest(versions.iter().map(String::as_str)).map_or_else(
        || {
            Err(GatewayError::ServiceUnavailable(
                "no runner is reachable".to_string(),
            ))
        },
        |lowest| Ok(json!({"version": lowest})),
    )
}

/// Raw version of one pinned runner, surfacing upstream error detail.
///
/// # Errors
///
/// `Validation` for an out-of-range index; upstream errors per the strict
/// fetch path.
pub async fn get_version_for_index(
    state: &GatewayState,
    index: usize,
) -> Result<Value, GatewayError> {
    let url = {
        let registry = state.registry.read().await;
        registry
            .url_for(index)
            .ok_or_else(|| GatewayError::Validation(format!("invalid runner index {index}")))?
            .to_string()
    };

    state
        .transport
        .fetch_json_strict(&format!("{url}/api/version"), None, None)
        .await
}
