//! Shared gateway state: registry, settings, catalog cache, and the
//! process-wide model index.
//!
//! The index is an `Arc` snapshot behind a lock: a catalog refresh builds
//! a brand-new map and swaps it in whole, so readers never observe a
//! half-updated index.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use ollamux_core::{AccessPolicy, Catalog, ModelProfileStore, ModelRecord, RunnerRegistry};

use crate::auth::IdentityProvider;
use crate::client::Transport;

/// Default TTL of the merged-catalog cache.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 1;

/// Default timeout for list-style calls (tags, ps, version, verify).
pub const DEFAULT_LIST_TIMEOUT_SECS: u64 = 10;

/// Default timeout for inference and pull calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Deployment-level gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GatewaySettings {
    /// Master switch; when off the catalog is empty and versions report
    /// `false` instead of erroring.
    pub enabled: bool,
    /// Forward the requester's name/id/email/role as headers to runners.
    pub forward_user_headers: bool,
    /// Skip all model access checks (single-tenant deployments).
    pub bypass_access_control: bool,
    pub cache_ttl_secs: u64,
    /// Bound for list-style calls; shorter than the inference timeout so a
    /// hanging runner cannot stall discovery.
    pub list_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            forward_user_headers: false,
            bypass_access_control: false,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            list_timeout_secs: DEFAULT_LIST_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl GatewaySettings {
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    #[must_use]
    pub const fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// TTL cache of merged catalogs, keyed per requester identity.
///
/// Concurrent misses are tolerated: both recompute, last write wins. No
/// single-flight de-duplication.
pub struct CatalogCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Arc<Catalog>)>>,
}

impl CatalogCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh entry for `key`, evicting it when it has expired.
    pub async fn get(&self, key: &str) -> Option<Arc<Catalog>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((stamp, catalog)) if stamp.elapsed() < self.ttl => Some(Arc::clone(catalog)),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a catalog, sweeping out every expired entry so the map stays
    /// bounded by the set of recently active identities.
    pub async fn put(&self, key: String, catalog: Arc<Catalog>) {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, (stamp, _)| stamp.elapsed() < self.ttl);
        entries.insert(key, (Instant::now(), catalog));
    }

    /// Drop every cached catalog; used when the registry changes.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

/// Shared gateway state — cloneable, injected via Axum `State`.
#[derive(Clone)]
pub struct GatewayState {
    pub transport: Transport,
    pub registry: Arc<RwLock<RunnerRegistry>>,
    pub settings: Arc<RwLock<GatewaySettings>>,
    pub cache: Arc<CatalogCache>,
    index: Arc<RwLock<Arc<HashMap<String, ModelRecord>>>>,
    pub profiles: Arc<dyn ModelProfileStore>,
    pub access: Arc<dyn AccessPolicy>,
    pub auth: Arc<dyn IdentityProvider>,
}

impl GatewayState {
    /// Wire up gateway state with a fresh HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        registry: RunnerRegistry,
        settings: GatewaySettings,
        profiles: Arc<dyn ModelProfileStore>,
        access: Arc<dyn AccessPolicy>,
        auth: Arc<dyn IdentityProvider>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().pool_max_idle_per_host(10).build()?;
        let transport = Transport::new(client, &settings);
        let cache = Arc::new(CatalogCache::new(settings.cache_ttl()));

        Ok(Self {
            transport,
            registry: Arc::new(RwLock::new(registry)),
            settings: Arc::new(RwLock::new(settings)),
            cache,
            index: Arc::new(RwLock::new(Arc::new(HashMap::new()))),
            profiles,
            access,
            auth,
        })
    }

    /// Current model-name index snapshot.
    pub async fn snapshot_index(&self) -> Arc<HashMap<String, ModelRecord>> {
        Arc::clone(&*self.index.read().await)
    }

    /// Atomically replace the model-name index with a freshly built map.
    pub async fn swap_index(&self, map: HashMap<String, ModelRecord>) {
        debug!(models = map.len(), "swapping model index");
        *self.index.write().await = Arc::new(map);
    }
}
