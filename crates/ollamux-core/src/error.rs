//! Gateway error taxonomy.
//!
//! Soft failures (a runner being unreachable during fan-out) are never
//! errors at all: the transport returns an absent value and aggregation
//! continues. Everything here is a hard failure that maps directly to a
//! gateway status code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// A runner answered with a non-success status and a parseable error
    /// body; surfaced with the runner's own status code and message.
    #[error("{message}")]
    Upstream { status: u16, message: String },

    /// A runner answered with a non-success status but the body carried no
    /// usable error message.
    #[error("ollamux: server connection error")]
    Connection { status: u16 },

    /// The inbound request body failed validation.
    #[error("{0}")]
    Validation(String),

    /// No runner serves the requested model.
    #[error("model '{0}' was not found")]
    ModelNotFound(String),

    /// The identity may not read this model.
    #[error("{0}")]
    Forbidden(String),

    /// Every runner failed during an aggregation that needs at least one
    /// answer (version reconciliation).
    #[error("{0}")]
    ServiceUnavailable(String),
}

impl GatewayError {
    /// Status code the gateway surface maps this error to.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Upstream { status, .. } | Self::Connection { status } => *status,
            Self::Validation(_) | Self::ModelNotFound(_) => 400,
            Self::Forbidden(_) => 403,
            Self::ServiceUnavailable(_) => 500,
        }
    }

    /// Generic connection error carrying the upstream status when known.
    #[must_use]
    pub const fn connection(status: Option<u16>) -> Self {
        Self::Connection {
            status: match status {
                Some(status) => status,
                None => 500,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            GatewayError::Upstream {
                status: 404,
                message: "pull model manifest: not found".to_string()
            }
            .status_code(),
            404
        );
        assert_eq!(GatewayError::connection(None).status_code(), 500);
        assert_eq!(GatewayError::connection(Some(502)).status_code(), 502);
        assert_eq!(
            GatewayError::Validation("bad body".to_string()).status_code(),
            400
        );
        assert_eq!(
            GatewayError::ModelNotFound("gpt".to_string()).status_code(),
            400
        );
        assert_eq!(
            GatewayError::Forbidden("model not found".to_string()).status_code(),
            403
        );
        assert_eq!(
            GatewayError::ServiceUnavailable("no runner reachable".to_string()).status_code(),
            500
        );
    }

    #[test]
    fn not_found_message_names_the_model() {
        let err = GatewayError::ModelNotFound("gpt".to_string());
        assert!(err.to_string().contains("gpt"));
    }
}
