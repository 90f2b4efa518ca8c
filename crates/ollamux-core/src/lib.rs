//! Domain layer for the ollamux inference gateway.
//!
//! This crate holds the pure parts of the gateway: the runner registry and
//! its per-runner configuration, the merged model catalog and its merge
//! rules, version reconciliation, identity/role types, the error taxonomy,
//! and the ports through which external collaborators (model metadata,
//! access policy) are consumed. No HTTP or runtime dependencies live here.

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

pub mod catalog;
pub mod error;
pub mod identity;
pub mod ports;
pub mod registry;
pub mod version;

pub use catalog::{Catalog, LoadedModel, ModelRecord, PsResponse, TagsResponse};
pub use error::GatewayError;
pub use identity::{Identity, Role};
pub use ports::{AccessPolicy, EmptyProfileStore, ModelProfile, ModelProfileStore, OwnerOrPublicAccess};
pub use registry::{RunnerConfig, RunnerEndpoint, RunnerRegistry};
