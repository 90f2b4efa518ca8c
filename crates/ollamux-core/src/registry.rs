//! Runner registry: the ordered list of backend endpoints and their
//! per-runner configuration.
//!
//! Config entries are keyed by the runner's stringified index, with a
//! fallback lookup by base URL for entries written before the last
//! reorder. Absent entries imply defaults (enabled, no key, no prefix).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Default connection label attached to models served by a runner.
pub const DEFAULT_CONNECTION_TYPE: &str = "docker";

/// Per-runner configuration.
///
/// Immutable per config generation; the whole registry is replaced on
/// update rather than patched in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Whether this runner participates in aggregation at all.
    pub enabled: bool,
    /// Bearer token attached to outbound requests, if the runner needs one.
    pub api_key: Option<String>,
    /// Connection label stamped onto every model this runner serves.
    pub connection_type: String,
    /// Namespace prefix; models are exposed as `{prefix}.{name}`.
    pub prefix: Option<String>,
    /// Tag set stamped onto every model, overwriting upstream tags.
    pub tags: Vec<String>,
    /// Explicit allow-list; when non-empty, models outside it are dropped.
    pub allowed_models: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            connection_type: DEFAULT_CONNECTION_TYPE.to_string(),
            prefix: None,
            tags: Vec::new(),
            allowed_models: Vec::new(),
        }
    }
}

/// A single backend endpoint resolved from the registry.
///
/// Identity is positional: the index is what selection and pinning refer
/// to. Endpoints are derived from the registry at read time, never stored.
#[derive(Debug, Clone)]
pub struct RunnerEndpoint {
    pub index: usize,
    pub base_url: String,
    pub config: RunnerConfig,
}

/// Ordered runner list plus the per-runner config map.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunnerRegistry {
    pub base_urls: Vec<String>,
    #[serde(default)]
    pub configs: HashMap<String, RunnerConfig>,
}

impl RunnerRegistry {
    /// Build a registry, pruning config keys that do not refer to a valid
    /// index for the given URL list.
    #[must_use]
    pub fn new(base_urls: Vec<String>, configs: HashMap<String, RunnerConfig>) -> Self {
        let mut registry = Self { base_urls, configs };
        registry.prune_stale_configs();
        registry
    }

    /// Resolve every runner in order, with its effective config.
    #[must_use]
    pub fn endpoints(&self) -> Vec<RunnerEndpoint> {
        self.base_urls
            .iter()
            .enumerate()
            .map(|(index, base_url)| RunnerEndpoint {
                index,
                base_url: base_url.clone(),
                config: self.config_for(index, base_url),
            })
            .collect()
    }

    /// Effective config for a runner: index key first, base URL key as a
    /// fallback, defaults when neither is present.
    #[must_use]
    pub fn config_for(&self, index: usize, base_url: &str) -> RunnerConfig {
        self.configs
            .get(&index.to_string())
            .or_else(|| self.configs.get(base_url))
            .cloned()
            .unwrap_or_default()
    }

    /// Base URL for a runner index, if the index is in range.
    #[must_use]
    pub fn url_for(&self, index: usize) -> Option<&str> {
        self.base_urls.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.base_urls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.base_urls.is_empty()
    }

    /// Replace the registry wholesale. Stale config entries (keys that are
    /// neither a valid index for the new URL list nor one of its URLs) are
    /// silently dropped; no error is raised for unknown keys.
    pub fn update(&mut self, base_urls: Vec<String>, configs: HashMap<String, RunnerConfig>) {
        self.base_urls = base_urls;
        self.configs = configs;
        self.prune_stale_configs();
    }

    fn prune_stale_configs(&mut self) {
        let len = self.base_urls.len();
        let urls = self.base_urls.clone();
        self.configs.retain(|key, _| {
            key.parse::<usize>().is_ok_and(|index| index < len) || urls.iter().any(|url| url == key)
        });
    }
}
