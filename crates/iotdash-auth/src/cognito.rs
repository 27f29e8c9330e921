//! Credentials from a Cognito identity pool.
//!
//! An unauthenticated pool identity is resolved once with `GetId`. Every
//! [`fetch`](CredentialSource::fetch) then calls `GetCredentialsForIdentity`,
//! so each connection attempt signs with a newly issued credential set.

use async_trait::async_trait;
use aws_sdk_cognitoidentity::config::{BehaviorVersion, Region};
use aws_sdk_cognitoidentity::error::DisplayErrorContext;
use aws_sdk_cognitoidentity::types::Credentials as IssuedCredentials;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::credentials::{CredentialSource, Credentials};
use crate::error::CredentialError;

/// [`CredentialSource`] backed by a Cognito identity pool.
#[derive(Debug)]
pub struct CognitoCredentialSource {
    client: aws_sdk_cognitoidentity::Client,
    identity_pool_id: String,
    identity_id: Mutex<Option<String>>,
}

impl CognitoCredentialSource {
    /// Create a source for `identity_pool_id` (e.g. `us-east-1:0f1e...`) in `region`.
    #[must_use]
    pub fn new(region: &str, identity_pool_id: impl Into<String>) -> Self {
        let config = aws_sdk_cognitoidentity::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_owned()))
            .build();
        Self::with_client(
            aws_sdk_cognitoidentity::Client::from_conf(config),
            identity_pool_id,
        )
    }

    /// Create a source over an existing client.
    #[must_use]
    pub fn with_client(
        client: aws_sdk_cognitoidentity::Client,
        identity_pool_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            identity_pool_id: identity_pool_id.into(),
            identity_id: Mutex::new(None),
        }
    }

    /// The identity pool credentials are issued from.
    #[must_use]
    pub fn identity_pool_id(&self) -> &str {
        &self.identity_pool_id
    }

    async fn identity_id(&self) -> Result<String, CredentialError> {
        if let Some(id) = self.identity_id.lock().clone() {
            return Ok(id);
        }

        let output = self
            .client
            .get_id()
            .identity_pool_id(&self.identity_pool_id)
            .send()
            .await
            .map_err(|e| {
                CredentialError::Provider(format!("GetId failed: {}", DisplayErrorContext(&e)))
            })?;
        let id = output
            .identity_id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CredentialError::Provider("GetId returned no identity".to_owned()))?
            .to_owned();

        info!(
            identity_pool = %self.identity_pool_id,
            identity_id = %id,
            "Resolved Cognito identity"
        );
        *self.identity_id.lock() = Some(id.clone());
        Ok(id)
    }
}

#[async_trait]
impl CredentialSource for CognitoCredentialSource {
    async fn fetch(&self) -> Result<Credentials, CredentialError> {
        let identity_id = self.identity_id().await?;

        let output = match self
            .client
            .get_credentials_for_identity()
            .identity_id(&identity_id)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                // The identity may have been removed from the pool; resolve
                // it again on the next fetch.
                self.identity_id.lock().take();
                warn!(identity_id = %identity_id, "GetCredentialsForIdentity failed");
                return Err(CredentialError::Provider(format!(
                    "GetCredentialsForIdentity failed: {}",
                    DisplayErrorContext(&e)
                )));
            }
        };

        let issued = output.credentials().ok_or_else(|| {
            CredentialError::Provider(
                "GetCredentialsForIdentity returned no credentials".to_owned(),
            )
        })?;
        let credentials = from_issued(issued)?;
        debug!(expires_at = %credentials.expires_at(), "Fetched Cognito credentials");
        Ok(credentials)
    }
}

/// Convert the SDK's credential shape, rejecting incomplete sets.
fn from_issued(issued: &IssuedCredentials) -> Result<Credentials, CredentialError> {
    let required = |value: Option<&str>, name: &str| {
        value
            .filter(|v| !v.is_empty())
            .map(ToOwned::to_owned)
            .ok_or_else(|| CredentialError::Missing(format!("Cognito {name}")))
    };
    let access_key_id = required(issued.access_key_id(), "AccessKeyId")?;
    let secret_key = required(issued.secret_key(), "SecretKey")?;

    let mut credentials = Credentials::new(access_key_id, secret_key);
    if let Some(token) = issued.session_token().filter(|t| !t.is_empty()) {
        credentials = credentials.with_session_token(token);
    }
    if let Some(expiration) = issued.expiration() {
        let expires_at =
            DateTime::<Utc>::from_timestamp(expiration.secs(), expiration.subsec_nanos())
                .ok_or_else(|| CredentialError::Malformed {
                    name: "Cognito Expiration".to_owned(),
                    reason: format!("{expiration} is out of range"),
                })?;
        credentials = credentials.with_expiry(expires_at);
    }
    Ok(credentials)
}
