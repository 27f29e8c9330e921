//! Canonical request construction for AWS Signature Version 4.
//!
//! A connection URL is signed as if it were a plain `GET` of the WebSocket
//! path with an empty body:
//!
//! ```text
//! GET\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n\n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! The query string is used exactly as given. The gateway recomputes the
//! signature over the sorted parameter list, so callers must hand in
//! parameters in lexicographic order; [`build_presign_query`] does that for
//! the fixed presign parameter set.

use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// The signing algorithm identifier.
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Hex SHA-256 of the empty payload.
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Everything except the SigV4 unreserved characters
/// (A-Z, a-z, 0-9, `-`, `_`, `.`, `~`) is percent-encoded.
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A canonical request, the normalized input of the string to sign.
///
/// Built transiently during signing and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    /// HTTP method, always `GET` for a connection upgrade.
    pub method: String,
    /// Request path (e.g. `/mqtt`).
    pub path: String,
    /// Query string without the signature parameter, in final order.
    pub query: String,
    /// Request headers available for signing.
    pub headers: Vec<(String, String)>,
    /// Lowercase names of the signed headers.
    pub signed_headers: Vec<String>,
    /// Hex SHA-256 of the request body.
    pub payload_hash: String,
}

impl CanonicalRequest {
    /// The canonical request for a presigned WebSocket upgrade.
    ///
    /// Only `host` is signed and the payload is empty.
    #[must_use]
    pub fn presigned_get(host: &str, path: &str, query: impl Into<String>) -> Self {
        Self {
            method: "GET".to_owned(),
            path: path.to_owned(),
            query: query.into(),
            headers: vec![("host".to_owned(), host.to_owned())],
            signed_headers: vec!["host".to_owned()],
            payload_hash: EMPTY_PAYLOAD_SHA256.to_owned(),
        }
    }

    /// Render the newline-delimited canonical form.
    ///
    /// # Examples
    ///
    /// ```
    /// use iotdash_auth::canonical::CanonicalRequest;
    ///
    /// let canonical = CanonicalRequest::presigned_get("example.com", "/mqtt", "a=1").render();
    /// assert!(canonical.starts_with("GET\n/mqtt\na=1\nhost:example.com\n\nhost\n"));
    /// ```
    #[must_use]
    pub fn render(&self) -> String {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let signed: Vec<&str> = self.signed_headers.iter().map(String::as_str).collect();

        let canonical_uri = build_canonical_uri(&self.path);
        let canonical_headers = build_canonical_headers(&headers, &signed);
        let signed_headers = build_signed_headers_string(&signed);

        format!(
            "{}\n{canonical_uri}\n{}\n{canonical_headers}\n\n{signed_headers}\n{}",
            self.method, self.query, self.payload_hash
        )
    }
}

/// Build the presign query string in the order the gateway expects.
///
/// The parameter names are already in lexicographic order. Any parameter
/// added here must keep that order or the gateway will compute a different
/// signature.
///
/// # Examples
///
/// ```
/// use iotdash_auth::canonical::build_presign_query;
///
/// let query = build_presign_query(
///     "AKID",
///     "20150830/us-east-1/iotdevicegateway/aws4_request",
///     "20150830T123600Z",
/// );
/// assert_eq!(
///     query,
///     "X-Amz-Algorithm=AWS4-HMAC-SHA256\
///      &X-Amz-Credential=AKID%2F20150830%2Fus-east-1%2Fiotdevicegateway%2Faws4_request\
///      &X-Amz-Date=20150830T123600Z\
///      &X-Amz-SignedHeaders=host"
/// );
/// ```
#[must_use]
pub fn build_presign_query(access_key_id: &str, credential_scope: &str, timestamp: &str) -> String {
    let credential = uri_encode(&format!("{access_key_id}/{credential_scope}"));
    [
        ("X-Amz-Algorithm", ALGORITHM),
        ("X-Amz-Credential", credential.as_str()),
        ("X-Amz-Date", timestamp),
        ("X-Amz-SignedHeaders", "host"),
    ]
    .iter()
    .map(|(k, v)| format!("{k}={v}"))
    .collect::<Vec<_>>()
    .join("&")
}

/// Build the canonical URI by URI-encoding each path segment individually.
///
/// Forward slashes are preserved and an empty path is normalized to `/`.
///
/// # Examples
///
/// ```
/// use iotdash_auth::canonical::build_canonical_uri;
///
/// assert_eq!(build_canonical_uri("/mqtt"), "/mqtt");
/// assert_eq!(build_canonical_uri(""), "/");
/// ```
#[must_use]
pub fn build_canonical_uri(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_owned();
    }

    path.split('/')
        .map(|segment| {
            // Decode first so an already-encoded path is not encoded twice.
            let decoded = percent_decode_str(segment).decode_utf8_lossy();
            uri_encode(&decoded)
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the canonical headers block.
///
/// Only headers listed in `signed_headers` are included. Names are lowercased,
/// values trimmed with inner whitespace runs collapsed, and lines sorted by
/// name. Repeated headers are joined with commas. No trailing newline.
#[must_use]
pub fn build_canonical_headers(headers: &[(&str, &str)], signed_headers: &[&str]) -> String {
    let mut header_map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let trimmed_value = collapse_whitespace(value.trim());
        header_map
            .entry(name.to_lowercase())
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(&trimmed_value);
            })
            .or_insert(trimmed_value);
    }

    let mut sorted_signed: Vec<&str> = signed_headers.to_vec();
    sorted_signed.sort_unstable();

    sorted_signed
        .iter()
        .filter_map(|name| header_map.get(*name).map(|value| format!("{name}:{value}")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the semicolon-separated, sorted list of signed header names.
///
/// # Examples
///
/// ```
/// use iotdash_auth::canonical::build_signed_headers_string;
///
/// assert_eq!(build_signed_headers_string(&["x-amz-date", "host"]), "host;x-amz-date");
/// ```
#[must_use]
pub fn build_signed_headers_string(signed_headers: &[&str]) -> String {
    let mut sorted: Vec<&str> = signed_headers.to_vec();
    sorted.sort_unstable();
    sorted.join(";")
}

/// Percent-encode a value with the SigV4 rules.
#[must_use]
pub fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, URI_ENCODE_SET).to_string()
}

fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    result
}
