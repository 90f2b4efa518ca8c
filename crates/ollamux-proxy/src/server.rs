//! Axum HTTP server for the gateway.
//!
//! `serve()` runs the gateway on a pre-bound listener until the
//! cancellation token fires; `router()` is exposed separately so tests
//! can drive the surface without a socket.

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::handlers;
use crate::state::GatewayState;

/// Build the gateway route tree.
#[must_use]
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(handlers::get_status))
        .route("/verify", post(handlers::verify_connection))
        .route("/config", get(handlers::get_config))
        .route("/config/update", post(handlers::update_config))
        .route("/api/tags", get(handlers::get_tags))
        .route("/api/tags/{index}", get(handlers::get_tags_for))
        .route("/api/ps", get(handlers::get_ps))
        .route("/api/version", get(handlers::get_version))
        .route("/api/version/{index}", get(handlers::get_version_for))
        .route("/api/pull", post(handlers::pull))
        .route("/api/pull/{index}", post(handlers::pull_for))
        .route("/api/chat", post(handlers::chat))
        .route("/api/chat/{index}", post(handlers::chat_for))
        .with_state(state)
}

/// Run the gateway on a pre-bound listener.
///
/// # Errors
///
/// Returns an error if the server fails to run.
pub async fn serve(
    listener: TcpListener,
    state: GatewayState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!("ollamux gateway listening on {addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("gateway shut down");
    Ok(())
}
