//! Signed connection URL assembly.
//!
//! The device gateway accepts a WebSocket upgrade when the URL carries these
//! query parameters, in this order:
//!
//! - `X-Amz-Algorithm` - Always `AWS4-HMAC-SHA256`
//! - `X-Amz-Credential` - `AKID/date/region/service/aws4_request`, percent-encoded
//! - `X-Amz-Date` - ISO 8601 basic format timestamp (`YYYYMMDDTHHMMSSZ`)
//! - `X-Amz-SignedHeaders` - Always `host`
//! - `X-Amz-Signature` - The hex-encoded signature
//! - `X-Amz-Security-Token` - The session token, only for temporary credentials
//!
//! The security token is appended after signing and authenticates separately.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::canonical::uri_encode;
use crate::credentials::Credentials;
use crate::error::SigningError;
use crate::sigv4::{SignatureResult, sign};

/// URL scheme of every signed connection URL.
pub const SCHEME: &str = "wss";

/// A signed connection URL.
///
/// Valid until the parent credentials expire, and meant for a single
/// connection attempt. The full URL embeds the session token, so `Debug`
/// only shows the host and path.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedUrl {
    host: String,
    path: String,
    query: String,
    url: String,
    expires_at: DateTime<Utc>,
}

impl SignedUrl {
    /// The full `wss://` URL.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// The URL scheme.
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        SCHEME
    }

    /// The gateway host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The full query string, including signature and security token.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Expiry of the credentials this URL was signed with.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Look up a raw (still percent-encoded) query parameter value.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::Utc;
    /// use iotdash_auth::{Credentials, presign};
    ///
    /// let url = presign("example.com", "/mqtt", "us-east-1", "iotdevicegateway",
    ///     &Credentials::new("AKID", "secret"), Utc::now()).unwrap();
    /// assert_eq!(url.query_param("X-Amz-SignedHeaders"), Some("host"));
    /// assert_eq!(url.query_param("X-Amz-Security-Token"), None);
    /// ```
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .split('&')
            .filter_map(|param| param.split_once('='))
            .find_map(|(key, value)| (key == name).then_some(value))
    }
}

impl fmt::Display for SignedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl fmt::Debug for SignedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedUrl")
            .field("host", &self.host)
            .field("path", &self.path)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Assemble a signed URL from a signature result.
///
/// Opens nothing. `path` must be the same path that was signed.
#[must_use]
pub fn build_signed_url(
    host: &str,
    path: &str,
    signature: &SignatureResult,
    credentials: &Credentials,
) -> SignedUrl {
    let mut query = format!(
        "{}&X-Amz-Signature={}",
        signature.canonical_query, signature.signature
    );
    if let Some(token) = credentials.session_token() {
        query.push_str("&X-Amz-Security-Token=");
        query.push_str(&uri_encode(token));
    }

    let url = format!("{SCHEME}://{host}{path}?{query}");

    SignedUrl {
        host: host.to_owned(),
        path: path.to_owned(),
        query,
        url,
        expires_at: credentials.expires_at(),
    }
}

/// Sign and assemble in one step.
///
/// Fails closed: on a signing error no URL is produced.
pub fn presign(
    host: &str,
    path: &str,
    region: &str,
    service: &str,
    credentials: &Credentials,
    now: DateTime<Utc>,
) -> Result<SignedUrl, SigningError> {
    let signature = sign(host, path, region, service, credentials, now)?;
    Ok(build_signed_url(host, path, &signature, credentials))
}
