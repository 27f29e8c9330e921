//! Decoding errors.

/// An inbound payload could not be decoded.
///
/// Scoped to one message; it never affects the connection.
#[derive(Debug, thiserror::Error)]
#[error("failed to decode payload on topic {topic}: {source}")]
pub struct DecodeError {
    /// Topic the payload arrived on.
    pub topic: String,
    /// Underlying JSON error.
    #[source]
    pub source: serde_json::Error,
}
