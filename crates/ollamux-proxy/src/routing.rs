//! Runner resolution for a logical model name.
//!
//! When several runners serve the same model the pick is uniformly random
//! over the eligible set, spreading load without any session affinity.

use rand::seq::SliceRandom;
use tracing::debug;

use ollamux_core::GatewayError;

use crate::state::GatewayState;

/// Ollama model names carry a version tag; bare names mean `:latest`.
#[must_use]
pub fn normalize_model_name(name: &str) -> String {
    if name.contains(':') {
        name.to_string()
    } else {
        format!("{name}:latest")
    }
}

/// Resolve which runner serves `model`.
///
/// A pinned index is used verbatim (the caller asserts validity up to the
/// registry bounds check). Otherwise the current index snapshot decides,
/// choosing uniformly at random among the runners hosting the model.
///
/// # Errors
///
/// `ModelNotFound` when no runner serves the model, `Validation` when the
/// index is out of registry range.
pub async fn resolve_runner(
    state: &GatewayState,
    model: &str,
    pinned: Option<usize>,
) -> Result<(String, usize), GatewayError> {
    let index = match pinned {
        Some(index) => index,
        None => {
            let snapshot = state.snapshot_index().await;
            let record = snapshot
                .get(model)
                .ok_or_else(|| GatewayError::ModelNotFound(model.to_string()))?;
            *record
                .urls
                .choose(&mut rand::thread_rng())
                .ok_or_else(|| GatewayError::ModelNotFound(model.to_string()))?
        }
    };

    let registry = state.registry.read().await;
    let url = registry
        .url_for(index)
        .ok_or_else(|| GatewayError::Validation(format!("invalid runner index {index}")))?
        .to_string();
    debug!(model, index, url, "resolved runner");
    Ok((url, index))
}
