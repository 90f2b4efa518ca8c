//! Wire forms for the gateway surface.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use ollamux_core::{GatewayError, RunnerConfig};

/// `POST /verify` body: probe a runner URL before adding it.
#[derive(Debug, Deserialize)]
pub struct VerifyConnectionForm {
    pub url: String,
    #[serde(default)]
    pub key: Option<String>,
}

/// Registry view returned by `GET /config` and accepted (with optional
/// fields) by `POST /config/update`.
#[derive(Debug, Serialize)]
pub struct GatewayConfigPayload {
    pub enabled: bool,
    pub base_urls: Vec<String>,
    pub configs: HashMap<String, RunnerConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GatewayConfigForm {
    #[serde(default)]
    pub enabled: Option<bool>,
    pub base_urls: Vec<String>,
    #[serde(default)]
    pub configs: HashMap<String, RunnerConfig>,
}

/// One chat message. `content` and `tool_calls` are kept loose (`Value`)
/// since runners accept more shapes than plain strings; validation only
/// requires that at least one of them is present.
#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub tool_calls: Option<Vec<Value>>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `POST /api/chat` body. Only the fields the gateway itself reads are
/// typed; everything else is forwarded untouched via the raw payload.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionForm {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletionForm {
    /// Every message needs textual content or a tool-call list.
    ///
    /// # Errors
    ///
    /// `Validation` naming the first offending message index.
    pub fn validate(&self) -> Result<(), GatewayError> {
        for (index, message) in self.messages.iter().enumerate() {
            if message.content.is_none() && message.tool_calls.is_none() {
                return Err(GatewayError::Validation(format!(
                    "message {index} must provide at least one of 'content' or 'tool_calls'"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(true)
    }
}
