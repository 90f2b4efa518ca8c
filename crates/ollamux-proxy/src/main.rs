//! Gateway entry point - the composition root.
//!
//! Loads the registry and settings from a JSON config file, wires the
//! default single-tenant collaborators, and serves until ctrl-c.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ollamux_core::{EmptyProfileStore, Identity, OwnerOrPublicAccess, Role, RunnerConfig, RunnerRegistry};
use ollamux_proxy::{GatewaySettings, GatewayState, StaticIdentity, serve};

#[derive(Parser)]
#[command(name = "ollamux", about = "Multi-runner Ollama-compatible inference gateway")]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:11434")]
    listen: SocketAddr,

    /// Path to a JSON config file (registry, settings, identity).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    settings: GatewaySettings,
    base_urls: Vec<String>,
    configs: HashMap<String, RunnerConfig>,
    /// Identity every request resolves to; defaults to a local admin.
    identity: Option<Identity>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => serde_json::from_str::<FileConfig>(&std::fs::read_to_string(path)?)?,
        None => FileConfig::default(),
    };

    let registry = RunnerRegistry::new(config.base_urls, config.configs);
    info!(runners = registry.len(), "loaded runner registry");

    let identity = config
        .identity
        .unwrap_or_else(|| Identity::new("admin", "Gateway Admin", "admin@localhost", Role::Admin));

    let state = GatewayState::new(
        registry,
        config.settings,
        Arc::new(EmptyProfileStore),
        Arc::new(OwnerOrPublicAccess),
        Arc::new(StaticIdentity::new(identity)),
    )?;

    let listener = TcpListener::bind(cli.listen).await?;
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
        shutdown.cancel();
    });

    serve(listener, state, cancel).await
}
