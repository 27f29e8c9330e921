//! Typed inbound payloads.
//!
//! Devices publish flat JSON objects. Field names follow the firmware
//! (`cardID`, `gasLevel`, `soilMoisture`); missing optional fields decode to
//! `None` so a partial update never fails the whole message.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::topic::DeviceTopic;

/// Snapshot from the security camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraFrame {
    /// Base64 JPEG, absent when the camera only reports status.
    #[serde(default)]
    pub picture: Option<String>,
}

/// State of the three lighting relays. Each relay is `0` (off) or `1` (on);
/// a device may report only the relays that changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightingState {
    /// Relay 1.
    #[serde(default)]
    pub relay1: Option<u8>,
    /// Relay 2.
    #[serde(default)]
    pub relay2: Option<u8>,
    /// Relay 3.
    #[serde(default)]
    pub relay3: Option<u8>,
}

impl LightingState {
    /// Overlay the relays reported in `update` onto `self`.
    #[must_use]
    pub fn merge(self, update: Self) -> Self {
        Self {
            relay1: update.relay1.or(self.relay1),
            relay2: update.relay2.or(self.relay2),
            relay3: update.relay3.or(self.relay3),
        }
    }
}

/// One energy monitor sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyReading {
    /// Sample time, unix seconds.
    pub timestamp: i64,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Relative humidity, percent.
    pub humidity: f64,
    /// Volts.
    pub voltage: f64,
    /// Amperes.
    pub current: f64,
    /// Watts.
    pub power: f64,
}

/// An RFID card presented at the door lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEvent {
    /// Card identifier.
    #[serde(rename = "cardID")]
    pub card_id: String,
    /// Access decision reported by the lock.
    pub status: String,
    /// Registered owner, if known.
    #[serde(default)]
    pub owner: Option<String>,
    /// Free-form message from the lock.
    #[serde(default)]
    pub message: Option<String>,
}

/// Kitchen gas sensor sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasReading {
    /// Status label such as `"Safe"` or `"Danger"`.
    pub status: String,
    /// Raw sensor level.
    pub gas_level: f64,
    /// Sample time in unix milliseconds, when the sensor sends one.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Garden sensor sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GardenReading {
    /// Degrees Celsius.
    pub temperature: f64,
    /// Relative humidity, percent.
    pub humidity: f64,
    /// Soil moisture, sensor units.
    pub soil_moisture: f64,
}

/// Garden irrigation relay state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GardenControl {
    /// `0` (off) or `1` (on).
    pub relay: u8,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceMessage {
    /// From [`DeviceTopic::Camera`].
    Camera(CameraFrame),
    /// From [`DeviceTopic::Lighting`].
    Lighting(LightingState),
    /// From [`DeviceTopic::Energy`].
    Energy(EnergyReading),
    /// From [`DeviceTopic::DoorLock`].
    DoorLock(LockEvent),
    /// From [`DeviceTopic::KitchenGas`].
    KitchenGas(GasReading),
    /// From [`DeviceTopic::GardenData`].
    GardenData(GardenReading),
    /// From [`DeviceTopic::GardenControl`].
    GardenControl(GardenControl),
    /// Any JSON payload on a topic with no typed model.
    Other {
        /// Topic the payload arrived on.
        topic: String,
        /// Parsed JSON.
        value: serde_json::Value,
    },
}

impl DeviceMessage {
    /// The device topic, or `None` for [`DeviceMessage::Other`].
    #[must_use]
    pub fn device_topic(&self) -> Option<DeviceTopic> {
        match self {
            Self::Camera(_) => Some(DeviceTopic::Camera),
            Self::Lighting(_) => Some(DeviceTopic::Lighting),
            Self::Energy(_) => Some(DeviceTopic::Energy),
            Self::DoorLock(_) => Some(DeviceTopic::DoorLock),
            Self::KitchenGas(_) => Some(DeviceTopic::KitchenGas),
            Self::GardenData(_) => Some(DeviceTopic::GardenData),
            Self::GardenControl(_) => Some(DeviceTopic::GardenControl),
            Self::Other { .. } => None,
        }
    }
}

/// Decode a payload received on `topic`.
///
/// # Examples
///
/// ```
/// use iotdash_model::{DeviceMessage, GardenControl, decode};
///
/// let message = decode("smartgarden/control", br#"{"relay":1}"#).unwrap();
/// assert_eq!(message, DeviceMessage::GardenControl(GardenControl { relay: 1 }));
/// ```
pub fn decode(topic: &str, payload: &[u8]) -> Result<DeviceMessage, DecodeError> {
    let wrap = |source| DecodeError {
        topic: topic.to_owned(),
        source,
    };

    let Ok(device_topic) = topic.parse::<DeviceTopic>() else {
        let value = serde_json::from_slice(payload).map_err(wrap)?;
        return Ok(DeviceMessage::Other {
            topic: topic.to_owned(),
            value,
        });
    };

    let message = match device_topic {
        DeviceTopic::Camera => {
            DeviceMessage::Camera(serde_json::from_slice(payload).map_err(wrap)?)
        }
        DeviceTopic::Lighting => {
            DeviceMessage::Lighting(serde_json::from_slice(payload).map_err(wrap)?)
        }
        DeviceTopic::Energy => {
            DeviceMessage::Energy(serde_json::from_slice(payload).map_err(wrap)?)
        }
        DeviceTopic::DoorLock => {
            DeviceMessage::DoorLock(serde_json::from_slice(payload).map_err(wrap)?)
        }
        DeviceTopic::KitchenGas => {
            DeviceMessage::KitchenGas(serde_json::from_slice(payload).map_err(wrap)?)
        }
        DeviceTopic::GardenData => {
            DeviceMessage::GardenData(serde_json::from_slice(payload).map_err(wrap)?)
        }
        DeviceTopic::GardenControl => {
            DeviceMessage::GardenControl(serde_json::from_slice(payload).map_err(wrap)?)
        }
    };
    Ok(message)
}
