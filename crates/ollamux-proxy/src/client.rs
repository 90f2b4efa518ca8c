//! Outbound transport to runner endpoints.
//!
//! Two GET flavors: `fetch_json` is the soft one used during fan-out (any
//! failure becomes `None` so aggregation keeps going), `fetch_json_strict`
//! is the pinned single-runner path that surfaces upstream error detail.
//! `post_stream` forwards chat/pull bodies, either buffering a JSON reply
//! or relaying the live byte stream; in both cases the upstream connection
//! is released exactly once, on every exit path, via a guard tied to the
//! response stream's lifetime.

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

use ollamux_core::{GatewayError, Identity};

use crate::state::GatewaySettings;

/// Requester-identity headers forwarded to runners when enabled.
const USER_NAME_HEADER: &str = "x-ollamux-user-name";
const USER_ID_HEADER: &str = "x-ollamux-user-id";
const USER_EMAIL_HEADER: &str = "x-ollamux-user-email";
const USER_ROLE_HEADER: &str = "x-ollamux-user-role";
const CHAT_ID_HEADER: &str = "x-ollamux-chat-id";

/// Response headers never copied from upstream: the relay re-frames the
/// body, so upstream framing headers would be wrong.
const SKIP_RESPONSE_HEADERS: &[&str] = &["content-length", "transfer-encoding", "connection"];

/// Percent-encode a header value, keeping literal spaces.
fn encode_preserving_spaces(value: &str) -> String {
    urlencoding::encode(value).replace("%20", " ")
}

/// Options for a forwarded POST.
#[derive(Default)]
pub struct PostOptions<'a> {
    pub api_key: Option<&'a str>,
    pub identity: Option<&'a Identity>,
    pub chat_id: Option<&'a str>,
    /// Replaces the upstream `Content-Type` on the relayed response; used
    /// to force `application/x-ndjson` for newline-delimited streaming.
    pub content_type: Option<&'a str>,
    pub stream: bool,
}

/// Either a buffered JSON reply or a live relay of the upstream body.
#[derive(Debug)]
pub enum ProxiedResponse {
    Json(Value),
    Streamed(Response),
}

impl IntoResponse for ProxiedResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Json(value) => axum::Json(value).into_response(),
            Self::Streamed(response) => response,
        }
    }
}

/// Fires its hook exactly once: explicitly for buffered responses, on drop
/// for streamed ones and for every early-error path.
struct ReleaseGuard {
    hook: Option<Box<dyn FnOnce() + Send>>,
}

impl ReleaseGuard {
    fn new(hook: impl FnOnce() + Send + 'static) -> Self {
        Self {
            hook: Some(Box::new(hook)),
        }
    }

    fn fire(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook();
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.fire();
    }
}

/// HTTP client for runner endpoints, with the deployment's timeouts and
/// identity-forwarding flag baked in.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    forward_user_headers: bool,
    list_timeout: Duration,
    request_timeout: Duration,
}

impl Transport {
    #[must_use]
    pub fn new(client: Client, settings: &GatewaySettings) -> Self {
        Self {
            client,
            forward_user_headers: settings.forward_user_headers,
            list_timeout: settings.list_timeout(),
            request_timeout: settings.request_timeout(),
        }
    }

    fn outbound_headers(
        &self,
        api_key: Option<&str>,
        identity: Option<&Identity>,
        chat_id: Option<&str>,
    ) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(key) = api_key
            && let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}"))
        {
            headers.insert(AUTHORIZATION, value);
        }

        if self.forward_user_headers
            && let Some(user) = identity
        {
            let pairs = [
                (USER_NAME_HEADER, encode_preserving_spaces(&user.name)),
                (USER_ID_HEADER, user.id.clone()),
                (USER_EMAIL_HEADER, user.email.clone()),
                (USER_ROLE_HEADER, user.role.as_str().to_string()),
            ];
            for (name, value) in pairs {
                if let Ok(value) = HeaderValue::from_str(&value) {
                    headers.insert(HeaderName::from_static(name), value);
                }
            }
            if let Some(chat_id) = chat_id
                && let Ok(value) = HeaderValue::from_str(chat_id)
            {
                headers.insert(HeaderName::from_static(CHAT_ID_HEADER), value);
            }
        }

        headers
    }

    /// Soft GET used during fan-out: any failure (connect, timeout,
    /// non-JSON body) is logged and becomes `None`. Callers treat `None`
    /// as "runner unavailable" and keep aggregating the others.
    pub async fn fetch_json(
        &self,
        url: &str,
        api_key: Option<&str>,
        identity: Option<&Identity>,
    ) -> Option<Value> {
        let result = self
            .client
            .get(url)
            .timeout(self.list_timeout)
            .headers(self.outbound_headers(api_key, identity, None))
            .send()
            .await;

        match result {
            Ok(response) => match response.json::<Value>().await {
                Ok(value) => Some(value),
                Err(e) => {
                    error!(url, error = %e, "runner returned a non-JSON body");
                    None
                }
            },
            Err(e) => {
                error!(url, error = %e, "connection error");
                None
            }
        }
    }

    /// Strict GET for pinned single-runner paths: upstream error detail is
    /// surfaced instead of absorbed.
    ///
    /// # Errors
    ///
    /// `Upstream` when the runner answers non-success with a parseable
    /// `error` field, `Connection` otherwise.
    pub async fn fetch_json_strict(
        &self,
        url: &str,
        api_key: Option<&str>,
        identity: Option<&Identity>,
    ) -> Result<Value, GatewayError> {
        let response = self
            .client
            .get(url)
            .timeout(self.list_timeout)
            .headers(self.outbound_headers(api_key, identity, None))
            .send()
            .await
            .map_err(|e| {
                error!(url, error = %e, "connection error");
                GatewayError::connection(None)
            })?;

        let status = response.status();
        if status.is_success() {
            response.json().await.map_err(|e| {
                error!(url, error = %e, "runner returned a non-JSON body");
                GatewayError::connection(Some(status.as_u16()))
            })
        } else {
            Err(error_from_response(response).await)
        }
    }

    /// Forward a POST to a runner.
    ///
    /// See [`Self::post_stream_with_release`]; this variant installs a
    /// logging release hook.
    ///
    /// # Errors
    ///
    /// Propagates transport and upstream errors per the taxonomy.
    pub async fn post_stream(
        &self,
        url: &str,
        payload: &Value,
        opts: PostOptions<'_>,
    ) -> Result<ProxiedResponse, GatewayError> {
        let target = url.to_string();
        self.post_stream_with_release(url, payload, opts, move || {
            debug!(url = %target, "upstream connection released");
        })
        .await
    }

    /// Forward a POST, invoking `release` exactly once when the upstream
    /// connection is done with — on stream completion or abandonment, on
    /// buffered return, and on every error path.
    ///
    /// # Errors
    ///
    /// `Upstream` for non-success statuses with a parseable error body,
    /// `Connection` for transport failures or unparseable bodies.
    pub async fn post_stream_with_release(
        &self,
        url: &str,
        payload: &Value,
        opts: PostOptions<'_>,
        release: impl FnOnce() + Send + 'static,
    ) -> Result<ProxiedResponse, GatewayError> {
        let mut guard = ReleaseGuard::new(release);

        let response = match self
            .client
            .post(url)
            .timeout(self.request_timeout)
            .headers(self.outbound_headers(opts.api_key, opts.identity, opts.chat_id))
            .json(payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(url, error = %e, "connection error");
                return Err(GatewayError::connection(None));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        if opts.stream {
            let upstream_headers = response.headers().clone();
            let byte_stream = response.bytes_stream().map(move |chunk| {
                let _ = &guard; // held until the relay stream is dropped
                chunk.map_err(std::io::Error::other)
            });

            let mut builder = Response::builder().status(status);
            for (name, value) in &upstream_headers {
                if SKIP_RESPONSE_HEADERS.contains(&name.as_str()) {
                    continue;
                }
                if opts.content_type.is_some() && name == CONTENT_TYPE {
                    continue;
                }
                builder = builder.header(name, value);
            }
            if let Some(content_type) = opts.content_type {
                builder = builder.header(CONTENT_TYPE, content_type);
            }

            let response = builder
                .body(Body::from_stream(byte_stream))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
            Ok(ProxiedResponse::Streamed(response))
        } else {
            let value = response.json::<Value>().await.map_err(|e| {
                error!(url, error = %e, "runner returned a non-JSON body");
                GatewayError::connection(Some(status.as_u16()))
            })?;
            guard.fire();
            Ok(ProxiedResponse::Json(value))
        }
    }
}

/// Translate a non-success upstream response: read the body once, surface
/// its `error` field with the upstream status, or a generic connection
/// error when the body is unusable.
async fn error_from_response(response: reqwest::Response) -> GatewayError {
    let status = response.status().as_u16();
    match response.json::<Value>().await {
        Ok(body) => match body.get("error").and_then(Value::as_str) {
            Some(message) => GatewayError::Upstream {
                status,
                message: message.to_string(),
            },
            None => GatewayError::connection(Some(status)),
        },
        Err(_) => GatewayError::connection(Some(status)),
    }
}
