//! Identity resolution port.
//!
//! Credential verification is an external collaborator: deployments plug
//! in their own provider. The gateway only distinguishes "any verified
//! identity" from "admin identity".

use async_trait::async_trait;
use axum::http::HeaderMap;

use ollamux_core::{GatewayError, Identity, Role};

/// Resolves the requesting identity from request headers.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Any verified identity.
    ///
    /// # Errors
    ///
    /// `Forbidden` when the request carries no acceptable credentials.
    async fn verified_user(&self, headers: &HeaderMap) -> Result<Identity, GatewayError>;

    /// A verified identity that also holds the admin role.
    ///
    /// # Errors
    ///
    /// `Forbidden` for unauthenticated or non-admin requests.
    async fn admin_user(&self, headers: &HeaderMap) -> Result<Identity, GatewayError> {
        let identity = self.verified_user(headers).await?;
        if identity.is_admin() {
            Ok(identity)
        } else {
            Err(GatewayError::Forbidden(
                "admin privileges required".to_string(),
            ))
        }
    }
}

/// Single-tenant provider: every request resolves to one fixed identity.
/// The default for the standalone binary; real deployments replace it.
pub struct StaticIdentity {
    identity: Identity,
}

impl StaticIdentity {
    #[must_use]
    pub const fn new(identity: Identity) -> Self {
        Self { identity }
    }

    /// A local admin identity.
    #[must_use]
    pub fn admin() -> Self {
        Self::new(Identity::new(
            "admin",
            "Gateway Admin",
            "admin@localhost",
            Role::Admin,
        ))
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn verified_user(&self, _headers: &HeaderMap) -> Result<Identity, GatewayError> {
        Ok(self.identity.clone())
    }
}
