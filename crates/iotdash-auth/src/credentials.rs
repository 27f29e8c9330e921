//! Credentials and the credential source trait.
//!
//! This module defines the immutable [`Credentials`] value consumed by the
//! signer, the [`CredentialSource`] trait the connection orchestrator fetches
//! it from, and a [`StaticCredentialSource`] for fixed keys.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CredentialError;

/// A temporary credential set.
///
/// Immutable once built. The secret key and session token are redacted from
/// the `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key_id: String,
    secret_key: String,
    session_token: Option<String>,
    expires_at: DateTime<Utc>,
}

impl Credentials {
    /// Create long-lived credentials without a session token.
    ///
    /// The expiry is set to the maximum representable instant.
    pub fn new(access_key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_key: secret_key.into(),
            session_token: None,
            expires_at: DateTime::<Utc>::MAX_UTC,
        }
    }

    /// Attach a session token.
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Set the instant after which these credentials are no longer accepted.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// The access key ID.
    #[must_use]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// The secret access key.
    #[must_use]
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    /// The session token, if these are temporary credentials.
    #[must_use]
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// The expiry instant.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the credentials have expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of short-lived credentials.
///
/// The orchestrator calls [`fetch`](CredentialSource::fetch) before every
/// connection attempt and never caches the result across attempts.
/// Implementations may talk to an identity provider; how credentials are
/// obtained or renewed is up to them.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Fetch a credential set for the next connection attempt.
    ///
    /// # Errors
    ///
    /// Returns a [`CredentialError`] if no usable credentials can be produced.
    async fn fetch(&self) -> Result<Credentials, CredentialError>;
}

/// A credential source that always returns the same credentials.
///
/// Once those credentials expire every fetch fails with
/// [`CredentialError::Expired`]; a static source has no way to renew them.
///
/// # Examples
///
/// ```
/// use iotdash_auth::{CredentialSource, Credentials, StaticCredentialSource};
///
/// # tokio_test::block_on(async {
/// let source = StaticCredentialSource::new(Credentials::new("AKID", "secret"));
/// let credentials = source.fetch().await.unwrap();
/// assert_eq!(credentials.access_key_id(), "AKID");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct StaticCredentialSource {
    credentials: Credentials,
}

impl StaticCredentialSource {
    /// Create a source that hands out `credentials`.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Build a source from the standard AWS environment variables.
    ///
    /// | Variable | Required |
    /// |----------|----------|
    /// | `AWS_ACCESS_KEY_ID` | yes |
    /// | `AWS_SECRET_ACCESS_KEY` | yes |
    /// | `AWS_SESSION_TOKEN` | no |
    /// | `AWS_CREDENTIAL_EXPIRATION` | no (RFC 3339) |
    pub fn from_env() -> Result<Self, CredentialError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a source from an arbitrary variable lookup.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, CredentialError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let access_key_id = non_empty("AWS_ACCESS_KEY_ID")
            .ok_or_else(|| CredentialError::Missing("AWS_ACCESS_KEY_ID".to_owned()))?;
        let secret_key = non_empty("AWS_SECRET_ACCESS_KEY")
            .ok_or_else(|| CredentialError::Missing("AWS_SECRET_ACCESS_KEY".to_owned()))?;

        let mut credentials = Credentials::new(access_key_id, secret_key);
        if let Some(token) = non_empty("AWS_SESSION_TOKEN") {
            credentials = credentials.with_session_token(token);
        }
        if let Some(raw) = non_empty("AWS_CREDENTIAL_EXPIRATION") {
            let expires_at = DateTime::parse_from_rfc3339(raw.trim()).map_err(|e| {
                CredentialError::Malformed {
                    name: "AWS_CREDENTIAL_EXPIRATION".to_owned(),
                    reason: e.to_string(),
                }
            })?;
            credentials = credentials.with_expiry(expires_at.with_timezone(&Utc));
        }

        Ok(Self::new(credentials))
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn fetch(&self) -> Result<Credentials, CredentialError> {
        if self.credentials.is_expired_at(Utc::now()) {
            return Err(CredentialError::Expired {
                expired_at: self.credentials.expires_at(),
            });
        }
        Ok(self.credentials.clone())
    }
}
