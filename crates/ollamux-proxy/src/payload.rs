//! Payload shaping for registered models: stored generation parameters
//! and system-prompt injection.
//!
//! Caller-supplied values always win; stored values only fill gaps. The
//! stored system prompt is the exception — it replaces an existing
//! system message, since the profile owner pinned it on purpose.

use serde_json::{Map, Value};

/// Ollama option keys a stored profile may carry. Anything else in the
/// stored params is ignored rather than forwarded blindly.
const OPTION_KEYS: &[&str] = &[
    "temperature",
    "top_p",
    "top_k",
    "min_p",
    "seed",
    "stop",
    "num_ctx",
    "num_batch",
    "num_keep",
    "num_predict",
    "num_gpu",
    "num_thread",
    "repeat_penalty",
    "repeat_last_n",
    "presence_penalty",
    "frequency_penalty",
    "mirostat",
    "mirostat_eta",
    "mirostat_tau",
    "tfs_z",
    "typical_p",
    "penalize_newline",
    "use_mmap",
    "use_mlock",
    "numa",
];

/// Top-level keys applied outside `options`.
const TOP_LEVEL_KEYS: &[&str] = &["format", "keep_alive"];

/// Merge stored generation parameters into the payload without clobbering
/// anything the caller already set.
pub fn apply_model_params(params: &Map<String, Value>, payload: &mut Value) {
    let Some(body) = payload.as_object_mut() else {
        return;
    };

    for key in TOP_LEVEL_KEYS {
        if let Some(value) = params.get(*key)
            && !value.is_null()
            && !body.contains_key(*key)
        {
            body.insert((*key).to_string(), value.clone());
        }
    }

    let options = body
        .entry("options")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(options) = options.as_object_mut() else {
        return;
    };
    for key in OPTION_KEYS {
        if let Some(value) = params.get(*key)
            && !value.is_null()
            && !options.contains_key(*key)
        {
            options.insert((*key).to_string(), value.clone());
        }
    }
}

/// Inject the stored system prompt as the leading message, replacing an
/// existing system message if the conversation already opens with one.
pub fn apply_system_prompt(system: &str, payload: &mut Value) {
    let Some(body) = payload.as_object_mut() else {
        return;
    };
    let messages = body
        .entry("messages")
        .or_insert_with(|| Value::Array(Vec::new()));
    let Some(messages) = messages.as_array_mut() else {
        return;
    };

    let system_message = serde_json::json!({"role": "system", "content": system});
    match messages.first() {
        Some(first) if first.get("role").and_then(Value::as_str) == Some("system") => {
            messages[0] = system_message;
        }
        _ => messages.insert(0, system_message),
    }
}
