//! Ollama-compatible gateway that fans requests out to many runners.
//!
//! One process presents the Ollama wire API; behind it, an arbitrary
//! number of independently configured runner endpoints are aggregated,
//! routed to, and proxied. See `ollamux-core` for the domain types.

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Used by the binary entry point only.
use clap as _;
use tracing_subscriber as _;

// Dev-dependency exercised by the tests/ suite, not the unit tests.
#[cfg(test)]
use tower as _;

pub mod auth;
pub mod catalog;
pub mod chat;
pub mod client;
pub mod handlers;
pub mod models;
pub mod payload;
pub mod routing;
pub mod server;
pub mod state;
pub mod version;

pub use auth::{IdentityProvider, StaticIdentity};
pub use server::{router, serve};
pub use state::{GatewaySettings, GatewayState};
