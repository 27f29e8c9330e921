//! Error types for signing and credential retrieval.

use chrono::{DateTime, Utc};

/// Errors raised while signing a connection request.
///
/// Signing is pure, so these only ever indicate malformed input. Nothing is
/// handed to the transport when signing fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SigningError {
    /// A credential component is empty or otherwise unusable.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// A request component (host, region, service, path) is empty or malformed.
    #[error("invalid signing request: {0}")]
    InvalidRequest(String),
}

/// Errors raised by a [`CredentialSource`](crate::CredentialSource).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// A required credential value is not configured.
    #[error("missing credential value: {0}")]
    Missing(String),

    /// A credential value is present but cannot be parsed.
    #[error("malformed credential value {name}: {reason}")]
    Malformed {
        /// Name of the offending value.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The only credentials available are past their expiry.
    #[error("credentials expired at {expired_at}")]
    Expired {
        /// When they stopped being valid.
        expired_at: DateTime<Utc>,
    },

    /// The identity provider refused or failed the request.
    #[error("identity provider error: {0}")]
    Provider(String),
}
