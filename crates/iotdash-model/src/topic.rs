//! Known device topics.

use std::fmt;
use std::str::FromStr;

/// Topics published by the devices the dashboard knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceTopic {
    /// Security camera snapshots.
    Camera,
    /// Three-relay lighting controller (state and commands).
    Lighting,
    /// Energy monitor readings.
    Energy,
    /// RFID door lock events.
    DoorLock,
    /// Kitchen gas sensor readings.
    KitchenGas,
    /// Garden sensor readings.
    GardenData,
    /// Garden irrigation relay (state and commands).
    GardenControl,
}

impl DeviceTopic {
    /// Every known topic, in subscription order.
    pub const ALL: [Self; 7] = [
        Self::Camera,
        Self::Lighting,
        Self::Energy,
        Self::DoorLock,
        Self::KitchenGas,
        Self::GardenData,
        Self::GardenControl,
    ];

    /// The topic name on the bus.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Camera => "myespcam",
            Self::Lighting => "smart/3lighting",
            Self::Energy => "cloud/esp32",
            Self::DoorLock => "myesplock",
            Self::KitchenGas => "mykitchen/gas",
            Self::GardenData => "smartgarden/data",
            Self::GardenControl => "smartgarden/control",
        }
    }
}

impl fmt::Display for DeviceTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceTopic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| format!("unknown device topic: {s}"))
    }
}
