//! Device model types for iotdash.
//!
//! Every device on the bus publishes JSON on a fixed topic. This crate names
//! those topics ([`DeviceTopic`]), decodes inbound payloads into a typed
//! [`DeviceMessage`], and encodes the outbound [`Command`]s the dashboard can
//! send.

pub mod command;
pub mod error;
pub mod payload;
pub mod topic;

pub use command::{Command, Relay};
pub use error::DecodeError;
pub use payload::{
    CameraFrame, DeviceMessage, EnergyReading, GardenControl, GardenReading, GasReading,
    LightingState, LockEvent, decode,
};
pub use topic::DeviceTopic;
