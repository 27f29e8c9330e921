//! Dashboard configuration.
//!
//! Provides [`DashboardConfig`]. All values are loaded from environment
//! variables via [`DashboardConfig::from_env`], falling back to defaults that
//! match the device fleet the dashboard was built for.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::{DashboardError, DashboardResult};
use crate::types::{AwsRegion, ClientId};

/// Topics the dashboard subscribes to when `MQTT_TOPICS` is not set.
pub const DEFAULT_TOPICS: [&str; 7] = [
    "myespcam",
    "smart/3lighting",
    "cloud/esp32",
    "myesplock",
    "mykitchen/gas",
    "smartgarden/data",
    "smartgarden/control",
];

/// Dashboard configuration.
///
/// # Examples
///
/// ```
/// use iotdash_core::DashboardConfig;
///
/// let config = DashboardConfig::default();
/// assert_eq!(config.service_name, "iotdevicegateway");
/// assert_eq!(config.mqtt_path, "/mqtt");
/// assert_eq!(config.reconnect_period().as_secs(), 5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct DashboardConfig {
    /// Device gateway host name (e.g. `abc123-ats.iot.us-east-1.amazonaws.com`).
    #[builder(default)]
    pub iot_endpoint: String,

    /// Region used in the credential scope.
    #[builder(default)]
    pub region: AwsRegion,

    /// Service name used in the credential scope.
    #[builder(default = String::from("iotdevicegateway"))]
    pub service_name: String,

    /// Request path of the MQTT WebSocket endpoint.
    #[builder(default = String::from("/mqtt"))]
    pub mqtt_path: String,

    /// Topics subscribed after every successful connect.
    #[builder(default = default_topics())]
    pub topics: Vec<String>,

    /// Fixed delay between a lost connection and the next attempt, in milliseconds.
    #[builder(default = 5_000)]
    pub reconnect_period_ms: u64,

    /// MQTT keep-alive interval in seconds.
    #[builder(default = 30)]
    pub keep_alive_secs: u16,

    /// Prefix for generated MQTT client identifiers.
    #[builder(default = String::from(ClientId::DEFAULT_PREFIX))]
    pub client_id_prefix: String,

    /// Cognito identity pool issuing temporary credentials. When unset, static
    /// credentials are read from the AWS environment variables.
    #[builder(default)]
    pub identity_pool_id: Option<String>,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            iot_endpoint: String::new(),
            region: AwsRegion::default(),
            service_name: String::from("iotdevicegateway"),
            mqtt_path: String::from("/mqtt"),
            topics: default_topics(),
            reconnect_period_ms: 5_000,
            keep_alive_secs: 30,
            client_id_prefix: String::from(ClientId::DEFAULT_PREFIX),
            identity_pool_id: None,
            log_level: String::from("info"),
        }
    }
}

impl DashboardConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `IOT_ENDPOINT` | *(empty)* |
    /// | `AWS_REGION` / `DEFAULT_REGION` | `us-east-1` |
    /// | `IOT_SERVICE_NAME` | `iotdevicegateway` |
    /// | `MQTT_PATH` | `/mqtt` |
    /// | `MQTT_TOPICS` | the seven dashboard topics |
    /// | `RECONNECT_PERIOD_MS` | `5000` |
    /// | `KEEP_ALIVE_SECS` | `30` |
    /// | `CLIENT_ID_PREFIX` | `mqtt_` |
    /// | `IDENTITY_POOL_ID` | *(unset)* |
    /// | `LOG_LEVEL` | `info` |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("IOT_ENDPOINT") {
            config.iot_endpoint = v.trim().to_owned();
        }
        if let Ok(v) = std::env::var("AWS_REGION").or_else(|_| std::env::var("DEFAULT_REGION")) {
            config.region = AwsRegion::new(v);
        }
        if let Ok(v) = std::env::var("IOT_SERVICE_NAME") {
            config.service_name = v;
        }
        if let Ok(v) = std::env::var("MQTT_PATH") {
            config.mqtt_path = v;
        }
        if let Ok(v) = std::env::var("MQTT_TOPICS") {
            let topics = parse_topics(&v);
            if !topics.is_empty() {
                config.topics = topics;
            }
        }
        if let Ok(v) = std::env::var("RECONNECT_PERIOD_MS") {
            if let Ok(n) = v.parse::<u64>() {
                config.reconnect_period_ms = n;
            }
        }
        if let Ok(v) = std::env::var("KEEP_ALIVE_SECS") {
            if let Ok(n) = v.parse::<u16>() {
                config.keep_alive_secs = n;
            }
        }
        if let Ok(v) = std::env::var("CLIENT_ID_PREFIX") {
            config.client_id_prefix = v;
        }
        if let Ok(v) = std::env::var("IDENTITY_POOL_ID") {
            let v = v.trim();
            if !v.is_empty() {
                config.identity_pool_id = Some(v.to_owned());
            }
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// Check that the configuration can be used to open a connection.
    pub fn validate(&self) -> DashboardResult<()> {
        if self.iot_endpoint.is_empty() {
            return Err(DashboardError::Config("IOT_ENDPOINT is not set".to_owned()));
        }
        if self.iot_endpoint.contains("://") || self.iot_endpoint.contains('/') {
            return Err(DashboardError::Config(format!(
                "IOT_ENDPOINT must be a bare host name, got {}",
                self.iot_endpoint
            )));
        }
        if !self.mqtt_path.starts_with('/') {
            return Err(DashboardError::Config(format!(
                "MQTT_PATH must start with '/', got {}",
                self.mqtt_path
            )));
        }
        if self.reconnect_period_ms == 0 {
            return Err(DashboardError::Config(
                "RECONNECT_PERIOD_MS must be greater than zero".to_owned(),
            ));
        }
        if self.topics.is_empty() {
            return Err(DashboardError::Config("no topics to subscribe".to_owned()));
        }
        if let Some(pool) = &self.identity_pool_id {
            if !pool.contains(':') {
                return Err(DashboardError::Config(format!(
                    "IDENTITY_POOL_ID must look like <region>:<uuid>, got {pool}"
                )));
            }
        }
        Ok(())
    }

    /// Delay between a lost connection and the next attempt.
    #[must_use]
    pub fn reconnect_period(&self) -> Duration {
        Duration::from_millis(self.reconnect_period_ms)
    }
}

fn default_topics() -> Vec<String> {
    DEFAULT_TOPICS.iter().map(|t| (*t).to_owned()).collect()
}

/// Split a comma-separated topic list, dropping blanks.
fn parse_topics(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
