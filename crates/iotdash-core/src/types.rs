//! Common type definitions shared across crates.

use std::fmt;

/// AWS Region identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AwsRegion(String);

impl AwsRegion {
    /// Default region used when nothing is configured.
    pub const DEFAULT: &str = "us-east-1";

    /// Create a new region.
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self(region.into())
    }

    /// Get the region as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AwsRegion {
    fn default() -> Self {
        Self(Self::DEFAULT.to_owned())
    }
}

impl fmt::Display for AwsRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// MQTT client identifier presented to the broker on CONNECT.
///
/// The broker drops an existing session when a second client connects with
/// the same identifier, so every connection attempt gets a fresh one built
/// from a v4 UUID (OS randomness) rather than a short pseudo-random suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ClientId(String);

impl ClientId {
    /// Default prefix for generated identifiers.
    pub const DEFAULT_PREFIX: &str = "mqtt_";

    /// Generate a new random identifier with the given prefix.
    ///
    /// # Examples
    ///
    /// ```
    /// use iotdash_core::ClientId;
    ///
    /// let id = ClientId::generate("mqtt_");
    /// assert!(id.as_str().starts_with("mqtt_"));
    /// assert_eq!(id.as_str().len(), "mqtt_".len() + 32);
    /// ```
    #[must_use]
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{prefix}{}", uuid::Uuid::new_v4().simple()))
    }

    /// Wrap an existing identifier verbatim.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
