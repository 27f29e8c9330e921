//! Outbound device commands.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde_json::json;

use crate::topic::DeviceTopic;

/// One of the three lighting relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relay {
    /// `relay1`.
    One,
    /// `relay2`.
    Two,
    /// `relay3`.
    Three,
}

impl Relay {
    /// The JSON field name the lighting controller expects.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            Self::One => "relay1",
            Self::Two => "relay2",
            Self::Three => "relay3",
        }
    }
}

impl FromStr for Relay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" | "relay1" => Ok(Self::One),
            "2" | "relay2" => Ok(Self::Two),
            "3" | "relay3" => Ok(Self::Three),
            other => Err(format!("unknown relay: {other}")),
        }
    }
}

/// A command the dashboard publishes to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Switch one lighting relay.
    Lighting {
        /// Which relay.
        relay: Relay,
        /// Desired state.
        on: bool,
    },
    /// Switch the garden irrigation relay.
    Garden {
        /// Desired state.
        on: bool,
    },
}

impl Command {
    /// The topic the command is published on.
    #[must_use]
    pub fn topic(&self) -> DeviceTopic {
        match self {
            Self::Lighting { .. } => DeviceTopic::Lighting,
            Self::Garden { .. } => DeviceTopic::GardenControl,
        }
    }

    /// The JSON payload.
    ///
    /// # Examples
    ///
    /// ```
    /// use iotdash_model::{Command, Relay};
    ///
    /// let command = Command::Lighting { relay: Relay::Two, on: true };
    /// assert_eq!(&command.payload()[..], br#"{"relay2":1}"#);
    /// ```
    #[must_use]
    pub fn payload(&self) -> Bytes {
        let value = match self {
            Self::Lighting { relay, on } => {
                let mut body = serde_json::Map::new();
                body.insert(relay.field().to_owned(), json!(u8::from(*on)));
                serde_json::Value::Object(body)
            }
            Self::Garden { on } => json!({ "relay": u8::from(*on) }),
        };
        Bytes::from(value.to_string())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = |on: bool| if on { "on" } else { "off" };
        match self {
            Self::Lighting { relay, on } => write!(f, "light {} {}", relay.field(), state(*on)),
            Self::Garden { on } => write!(f, "garden {}", state(*on)),
        }
    }
}
