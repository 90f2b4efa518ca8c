//! Merged model catalog: record types, per-runner transforms, and the
//! cross-runner merge rules.
//!
//! Upstream runners may attach fields this gateway does not know about,
//! so records are semi-structured: the fields the gateway reads are typed,
//! everything else rides along in a flattened side-map.
//!
//! Merge rule: runners are visited in registry order; the first runner to
//! expose a (post-prefix) model name wins the record's scalar fields, and
//! every further runner exposing the same name only appends its index to
//! `urls`. Deterministic given a fixed registry and fixed runner output.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::registry::RunnerConfig;

/// One model as seen through the gateway, after per-runner transforms.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelRecord {
    /// Gateway-visible model name; the unique merge key.
    pub model: String,
    /// Indices of the runners known to serve this model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<usize>,
    /// Epoch seconds at which the loaded instance expires, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// Gateway-assigned tags (overwrites upstream tags when configured).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Connection label of the serving runner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    /// Opaque runner-supplied fields, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of a runner's "currently loaded" listing.
///
/// `expires_at` is the runner's ISO-8601 timestamp, kept as a string here
/// and converted to epoch seconds only when annotating the catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoadedModel {
    pub model: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LoadedModel {
    /// Parse the expiry timestamp into epoch seconds. Accepts RFC 3339 and
    /// naive (zoneless) ISO-8601; anything else is logged and dropped.
    #[must_use]
    pub fn expires_epoch(&self) -> Option<i64> {
        let raw = self.expires_at.as_deref()?;
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.timestamp());
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(naive.and_utc().timestamp());
        }
        debug!(model = %self.model, expires_at = raw, "unparseable expiry timestamp");
        None
    }
}

/// Wire shape of a runner's `GET /api/tags` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelRecord>,
}

/// Wire shape of a runner's `GET /api/ps` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PsResponse {
    #[serde(default)]
    pub models: Vec<LoadedModel>,
}

/// A model entry that can take part in the cross-runner merge.
pub trait Mergeable {
    fn name(&self) -> &str;
    fn urls_mut(&mut self) -> &mut Vec<usize>;
}

impl Mergeable for ModelRecord {
    fn name(&self) -> &str {
        &self.model
    }
    fn urls_mut(&mut self) -> &mut Vec<usize> {
        &mut self.urls
    }
}

impl Mergeable for LoadedModel {
    fn name(&self) -> &str {
        &self.model
    }
    fn urls_mut(&mut self) -> &mut Vec<usize> {
        &mut self.urls
    }
}

/// Merge per-runner model lists into one deduplicated list.
///
/// `lists` is index-aligned with the registry: unreachable or disabled
/// runners contribute `None` and keep their slot so indices stay honest.
/// First occurrence wins scalar fields; `urls` accumulates every
/// contributing runner index in registry order.
#[must_use]
pub fn merge_model_lists<T: Mergeable>(lists: Vec<Option<Vec<T>>>) -> Vec<T> {
    let mut merged: Vec<T> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (index, list) in lists.into_iter().enumerate() {
        let Some(list) = list else { continue };
        for mut entry in list {
            if entry.name().is_empty() {
                continue;
            }
            match positions.get(entry.name()) {
                Some(&pos) => merged[pos].urls_mut().push(index),
                None => {
                    positions.insert(entry.name().to_string(), merged.len());
                    *entry.urls_mut() = vec![index];
                    merged.push(entry);
                }
            }
        }
    }

    merged
}

/// Apply a runner's transforms to its raw tag listing, in order:
/// allow-list filter, prefix rewrite, tag overwrite, connection label.
pub fn apply_runner_transforms(models: &mut Vec<ModelRecord>, config: &RunnerConfig) {
    if !config.allowed_models.is_empty() {
        models.retain(|model| config.allowed_models.contains(&model.model));
    }
    for model in models.iter_mut() {
        if let Some(prefix) = &config.prefix {
            model.model = format!("{prefix}.{}", model.model);
        }
        if !config.tags.is_empty() {
            model.tags = Some(config.tags.clone());
        }
        model.connection_type = Some(config.connection_type.clone());
    }
}

/// The merged, deduplicated view of all models across all runners, with a
/// derived name index for O(1) resolution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalog {
    pub models: Vec<ModelRecord>,
    #[serde(skip)]
    by_name: HashMap<String, usize>,
}

impl Catalog {
    #[must_use]
    pub fn new(models: Vec<ModelRecord>) -> Self {
        let by_name = models
            .iter()
            .enumerate()
            .map(|(pos, model)| (model.model.clone(), pos))
            .collect();
        Self { models, by_name }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ModelRecord> {
        self.by_name.get(name).map(|&pos| &self.models[pos])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Owned name → record map, used as the process-wide selection index.
    #[must_use]
    pub fn index_map(&self) -> HashMap<String, ModelRecord> {
        self.models
            .iter()
            .map(|model| (model.model.clone(), model.clone()))
            .collect()
    }
}
