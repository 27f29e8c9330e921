//! AWS Signature Version 4 signing of a connection request.
//!
//! The flow mirrors what the gateway does on its side:
//!
//! 1. Format the signing instant as `YYYYMMDDTHHMMSSZ` and take its first
//!    eight characters as the date stamp.
//! 2. Build the credential scope `date/region/service/aws4_request`.
//! 3. Build the presign query and the canonical request over it.
//! 4. Build the string to sign from the timestamp, scope and canonical hash.
//! 5. Derive the signing key through the HMAC chain and sign.
//!
//! The main entry point is [`sign`].

use chrono::{DateTime, Utc};
use hmac::{Hmac, KeyInit, Mac};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::canonical::{ALGORITHM, CanonicalRequest, build_presign_query};
use crate::credentials::Credentials;
use crate::error::SigningError;

/// Terminator of every credential scope.
pub const SCOPE_TERMINATOR: &str = "aws4_request";

/// `strftime` format of `X-Amz-Date`.
const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

type HmacSha256 = Hmac<Sha256>;

/// Output of [`sign`]: everything the URL builder needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureResult {
    /// The `X-Amz-Date` value.
    pub timestamp: String,
    /// `date/region/service/aws4_request`.
    pub credential_scope: String,
    /// The signed query string, without `X-Amz-Signature`.
    pub canonical_query: String,
    /// Hex-encoded signature.
    pub signature: String,
}

/// The per-request HMAC key derivation chain.
///
/// ```text
/// date_key    = HMAC-SHA256("AWS4" + secret_key, date_stamp)
/// region_key  = HMAC-SHA256(date_key, region)
/// service_key = HMAC-SHA256(region_key, service)
/// signing_key = HMAC-SHA256(service_key, "aws4_request")
/// ```
///
/// Every key is 32 bytes. The chain depends on the date stamp, so it is
/// derived again for every signature and never cached.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKeyChain {
    /// Key bound to the date stamp.
    pub date_key: Vec<u8>,
    /// Key bound to date and region.
    pub region_key: Vec<u8>,
    /// Key bound to date, region and service.
    pub service_key: Vec<u8>,
    /// Final signing key.
    pub signing_key: Vec<u8>,
}

impl SigningKeyChain {
    /// Derive the chain for one signing operation.
    #[must_use]
    pub fn derive(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Self {
        let date_key = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date_stamp.as_bytes());
        let region_key = hmac_sha256(&date_key, region.as_bytes());
        let service_key = hmac_sha256(&region_key, service.as_bytes());
        let signing_key = hmac_sha256(&service_key, SCOPE_TERMINATOR.as_bytes());
        Self {
            date_key,
            region_key,
            service_key,
            signing_key,
        }
    }
}

impl std::fmt::Debug for SigningKeyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyChain").finish_non_exhaustive()
    }
}

/// Derive only the final signing key.
///
/// # Examples
///
/// ```
/// use iotdash_auth::sigv4::derive_signing_key;
///
/// let key = derive_signing_key(
///     "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
///     "20150830",
///     "us-east-1",
///     "iotdevicegateway",
/// );
/// assert_eq!(key.len(), 32);
/// ```
#[must_use]
pub fn derive_signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Vec<u8> {
    SigningKeyChain::derive(secret_key, date_stamp, region, service).signing_key
}

/// Format an instant as an `X-Amz-Date` value.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use iotdash_auth::sigv4::format_amz_date;
///
/// let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
/// assert_eq!(format_amz_date(now), "20150830T123600Z");
/// ```
#[must_use]
pub fn format_amz_date(now: DateTime<Utc>) -> String {
    now.format(AMZ_DATE_FORMAT).to_string()
}

/// Build the SigV4 string to sign.
#[must_use]
pub fn build_string_to_sign(
    timestamp: &str,
    credential_scope: &str,
    canonical_request_hash: &str,
) -> String {
    format!("{ALGORITHM}\n{timestamp}\n{credential_scope}\n{canonical_request_hash}")
}

/// Compute the hex-encoded HMAC-SHA256 of `data` under `signing_key`.
#[must_use]
pub fn compute_signature(signing_key: &[u8], data: &str) -> String {
    hex::encode(hmac_sha256(signing_key, data.as_bytes()))
}

/// Compute the hex SHA-256 of a payload.
///
/// # Examples
///
/// ```
/// use iotdash_auth::sigv4::hash_payload;
///
/// assert_eq!(
///     hash_payload(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
#[must_use]
pub fn hash_payload(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Sign a WebSocket connection request for `host` and `path`.
///
/// Deterministic for identical inputs and free of I/O. The session token is
/// not part of the signed material.
///
/// # Errors
///
/// Returns [`SigningError::InvalidCredentials`] for an empty access key or
/// secret key and [`SigningError::InvalidRequest`] for an empty host, region,
/// or service, or a path that does not start with `/`.
pub fn sign(
    host: &str,
    path: &str,
    region: &str,
    service: &str,
    credentials: &Credentials,
    now: DateTime<Utc>,
) -> Result<SignatureResult, SigningError> {
    validate_inputs(host, path, region, service, credentials)?;

    let timestamp = format_amz_date(now);
    let date_stamp = &timestamp[..8];
    let credential_scope = format!("{date_stamp}/{region}/{service}/{SCOPE_TERMINATOR}");

    let canonical_query =
        build_presign_query(credentials.access_key_id(), &credential_scope, &timestamp);
    let canonical_request =
        CanonicalRequest::presigned_get(host, path, canonical_query.clone()).render();

    debug!(canonical_request, "Built canonical request");

    let canonical_hash = hash_payload(canonical_request.as_bytes());
    let string_to_sign = build_string_to_sign(&timestamp, &credential_scope, &canonical_hash);

    debug!(string_to_sign, "Built string to sign");

    let signing_key = derive_signing_key(credentials.secret_key(), date_stamp, region, service);
    let signature = compute_signature(&signing_key, &string_to_sign);

    Ok(SignatureResult {
        timestamp,
        credential_scope,
        canonical_query,
        signature,
    })
}

fn validate_inputs(
    host: &str,
    path: &str,
    region: &str,
    service: &str,
    credentials: &Credentials,
) -> Result<(), SigningError> {
    if credentials.access_key_id().trim().is_empty() {
        return Err(SigningError::InvalidCredentials("empty access key id".to_owned()));
    }
    if credentials.secret_key().is_empty() {
        return Err(SigningError::InvalidCredentials("empty secret key".to_owned()));
    }
    if host.trim().is_empty() || host.contains(char::is_whitespace) {
        return Err(SigningError::InvalidRequest(format!("invalid host {host:?}")));
    }
    if !path.starts_with('/') {
        return Err(SigningError::InvalidRequest(format!("invalid path {path:?}")));
    }
    if region.trim().is_empty() {
        return Err(SigningError::InvalidRequest("empty region".to_owned()));
    }
    if service.trim().is_empty() {
        return Err(SigningError::InvalidRequest("empty service name".to_owned()));
    }
    Ok(())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can accept keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
