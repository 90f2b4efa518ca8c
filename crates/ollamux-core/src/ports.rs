//! Ports for the gateway's external collaborators.
//!
//! The model metadata store and the access-control evaluator live outside
//! this system; the gateway consumes them through these narrow interfaces
//! and injects them as `Arc<dyn Trait>` at composition time.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::identity::Identity;

/// Metadata registered for a gateway-visible model id.
#[derive(Debug, Clone, Default)]
pub struct ModelProfile {
    /// The id this profile was registered under.
    pub id: String,
    /// Upstream model id to substitute before forwarding, when aliased.
    pub base_model_id: Option<String>,
    /// Stored generation parameters to apply to chat payloads.
    pub params: Map<String, Value>,
    /// Stored system prompt to inject into chat payloads.
    pub system_prompt: Option<String>,
    /// Identity id of the profile owner.
    pub owner_id: String,
    /// Opaque access-control descriptor; `None` means public.
    pub access_control: Option<Value>,
}

/// Lookup of registered model metadata by id.
#[async_trait]
pub trait ModelProfileStore: Send + Sync {
    async fn get(&self, model_id: &str) -> Option<ModelProfile>;
}

/// Evaluates whether an identity may read a registered model.
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    async fn can_read(&self, identity: &Identity, profile: &ModelProfile) -> bool;
}

/// Profile store for deployments without a metadata store: knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyProfileStore;

#[async_trait]
impl ModelProfileStore for EmptyProfileStore {
    async fn get(&self, _model_id: &str) -> Option<ModelProfile> {
        None
    }
}

/// Minimal stand-in policy: profiles without an access-control descriptor
/// are public, everything else is owner-only. Deployments plug in their
/// real evaluator here.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerOrPublicAccess;

#[async_trait]
impl AccessPolicy for OwnerOrPublicAccess {
    async fn can_read(&self, identity: &Identity, profile: &ModelProfile) -> bool {
        profile.access_control.is_none() || identity.id == profile.owner_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;

    #[tokio::test]
    async fn empty_store_knows_nothing() {
        assert!(EmptyProfileStore.get("llama3:latest").await.is_none());
    }

    #[tokio::test]
    async fn owner_or_public_policy() {
        let owner = Identity::new("u1", "Ada", "ada@example.com", Role::User);
        let stranger = Identity::new("u2", "Bob", "bob@example.com", Role::User);

        let public = ModelProfile {
            owner_id: "u1".to_string(),
            ..ModelProfile::default()
        };
        let restricted = ModelProfile {
            owner_id: "u1".to_string(),
            access_control: Some(serde_json::json!({"read": {"group_ids": []}})),
            ..ModelProfile::default()
        };

        assert!(OwnerOrPublicAccess.can_read(&stranger, &public).await);
        assert!(OwnerOrPublicAccess.can_read(&owner, &restricted).await);
        assert!(!OwnerOrPublicAccess.can_read(&stranger, &restricted).await);
    }
}
