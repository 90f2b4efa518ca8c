//! Full-surface tests driven through the router: chat proxying with
//! prefix round-trips, validation and access failures, pinned routing,
//! and visibility filtering on the tag listing.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use ollamux_core::{ModelProfile, RunnerConfig};
use ollamux_proxy::{GatewaySettings, router};

use common::{
    MapProfileStore, admin_identity, spawn_runner_with_models, test_state, test_state_with,
    user_identity,
};

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn chat_strips_runner_prefix_and_request_metadata() {
    let a = spawn_runner_with_models(&["llama3:latest"], "1.0.0").await;
    let configs = HashMap::from([(
        "0".to_string(),
        RunnerConfig {
            prefix: Some("teamA".to_string()),
            ..RunnerConfig::default()
        },
    )]);
    let state = test_state(vec![a.base_url.clone()], configs, admin_identity());
    let app = router(state);

    let (status, body) = post_json(
        app,
        "/api/chat",
        json!({
            "model": "teamA.llama3",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": false,
            "metadata": {"chat_id": "c1"}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(a.stats.chats(), 1);
    // The runner sees its native name, the gateway alias is stripped.
    assert_eq!(body["forwarded"]["model"], "llama3:latest");
    assert!(body["forwarded"].get("metadata").is_none());
    assert_eq!(body["forwarded"]["stream"], false);
}

#[tokio::test]
async fn chat_for_an_unknown_model_names_it_in_the_error() {
    let a = spawn_runner_with_models(&["llama3:latest"], "1.0.0").await;
    let state = test_state(vec![a.base_url.clone()], HashMap::new(), admin_identity());
    let app = router(state);

    let (status, body) = post_json(
        app,
        "/api/chat",
        json!({
            "model": "gpt-5",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": false
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("gpt-5"), "unexpected error: {message}");
}

#[tokio::test]
async fn chat_rejects_messages_without_content_or_tool_calls() {
    let a = spawn_runner_with_models(&["llama3:latest"], "1.0.0").await;
    let state = test_state(vec![a.base_url.clone()], HashMap::new(), admin_identity());
    let app = router(state);

    let (status, body) = post_json(
        app,
        "/api/chat",
        json!({
            "model": "llama3",
            "messages": [{"role": "assistant", "content": null, "tool_calls": null}],
            "stream": false
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("message 0"));
    assert_eq!(a.stats.chats(), 0);
}

#[tokio::test]
async fn chat_on_an_unregistered_model_is_forbidden_for_non_admins() {
    let a = spawn_runner_with_models(&["llama3:latest"], "1.0.0").await;
    let state = test_state(vec![a.base_url.clone()], HashMap::new(), user_identity());
    let app = router(state);

    let (status, body) = post_json(
        app,
        "/api/chat",
        json!({
            "model": "llama3",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": false
        }),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    // Deliberately indistinguishable from a missing model.
    assert_eq!(body["error"], "model not found");
    assert_eq!(a.stats.chats(), 0);
}

#[tokio::test]
async fn pinned_chat_skips_the_catalog_lookup() {
    let a = spawn_runner_with_models(&[], "1.0.0").await;
    let b = spawn_runner_with_models(&[], "1.0.0").await;
    let state = test_state(
        vec![a.base_url.clone(), b.base_url.clone()],
        HashMap::new(),
        admin_identity(),
    );
    let app = router(state);

    let (status, body) = post_json(
        app,
        "/api/chat/1",
        json!({
            "model": "scratch-model",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": false
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(a.stats.chats(), 0);
    assert_eq!(b.stats.chats(), 1);
    assert_eq!(body["forwarded"]["model"], "scratch-model:latest");
}

#[tokio::test]
async fn profile_substitutes_base_model_and_applies_params() {
    let a = spawn_runner_with_models(&["llama3:latest"], "1.0.0").await;
    let profile = ModelProfile {
        id: "support-bot".to_string(),
        base_model_id: Some("llama3".to_string()),
        params: json!({"temperature": 0.2}).as_object().cloned().unwrap(),
        system_prompt: Some("You are terse.".to_string()),
        owner_id: "u1".to_string(),
        access_control: None,
    };
    let profiles = Arc::new(MapProfileStore(HashMap::from([(
        "support-bot".to_string(),
        profile,
    )])));
    let state = test_state_with(
        vec![a.base_url.clone()],
        HashMap::new(),
        GatewaySettings {
            cache_ttl_secs: 60,
            ..GatewaySettings::default()
        },
        profiles,
        user_identity(),
    );
    let app = router(state);

    let (status, body) = post_json(
        app,
        "/api/chat",
        json!({
            "model": "support-bot",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": false
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let forwarded = &body["forwarded"];
    assert_eq!(forwarded["model"], "llama3:latest");
    assert_eq!(forwarded["options"]["temperature"], 0.2);
    assert_eq!(forwarded["messages"][0]["role"], "system");
    assert_eq!(forwarded["messages"][0]["content"], "You are terse.");
}

#[tokio::test]
async fn tag_listing_is_filtered_for_non_admins() {
    let a = spawn_runner_with_models(&["llama3:latest", "mistral:latest"], "1.0.0").await;
    let profile = ModelProfile {
        id: "llama3:latest".to_string(),
        base_model_id: None,
        params: serde_json::Map::new(),
        system_prompt: None,
        owner_id: "u1".to_string(),
        access_control: Some(json!({"read": {"user_ids": []}})),
    };
    let profiles = Arc::new(MapProfileStore(HashMap::from([(
        "llama3:latest".to_string(),
        profile,
    )])));
    let state = test_state_with(
        vec![a.base_url.clone()],
        HashMap::new(),
        GatewaySettings {
            cache_ttl_secs: 60,
            ..GatewaySettings::default()
        },
        profiles,
        user_identity(),
    );
    let app = router(state);

    let (status, body) = get_json(app, "/api/tags").await;
    assert_eq!(status, StatusCode::OK);

    // mistral has no profile and is hidden; llama3 is owner-visible.
    let models = body["models"].as_array().unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0]["model"], "llama3:latest");
}

#[tokio::test]
async fn admin_endpoints_refuse_plain_users() {
    let a = spawn_runner_with_models(&["llama3:latest"], "1.0.0").await;
    let state = test_state(vec![a.base_url.clone()], HashMap::new(), user_identity());

    let (status, _) = get_json(router(state.clone()), "/api/ps").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = get_json(router(state.clone()), "/config").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = post_json(
        router(state),
        "/api/pull",
        json!({"name": "llama3:latest"}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn config_update_replaces_the_registry_and_drops_the_cache() {
    let a = spawn_runner_with_models(&["llama3:latest"], "1.0.0").await;
    let b = spawn_runner_with_models(&["phi3:latest"], "1.0.0").await;
    let state = test_state(vec![a.base_url.clone()], HashMap::new(), admin_identity());

    let (status, body) = get_json(router(state.clone()), "/api/tags").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["models"][0]["model"], "llama3:latest");

    let (status, body) = post_json(
        router(state.clone()),
        "/config/update",
        json!({"base_urls": [b.base_url]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["base_urls"].as_array().unwrap().len(), 1);

    let (status, body) = get_json(router(state), "/api/tags").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["models"][0]["model"], "phi3:latest");
    assert_eq!(body["models"][0]["urls"], json!([0]));
}

#[tokio::test]
async fn pull_injects_insecure_and_aliases_name_to_model() {
    let a = spawn_runner_with_models(&[], "1.0.0").await;
    let state = test_state(vec![a.base_url.clone()], HashMap::new(), admin_identity());

    let (status, body) = post_json(
        router(state),
        "/api/pull",
        json!({"name": "llama3:latest"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["forwarded"]["model"], "llama3:latest");
    assert_eq!(body["forwarded"]["insecure"], true);
}
