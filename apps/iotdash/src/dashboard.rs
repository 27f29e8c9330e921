//! Latest device readings, as shown by `status`.

use std::fmt;
use std::sync::Arc;

use iotdash_model::{
    DeviceMessage, EnergyReading, GardenReading, GasReading, LightingState, LockEvent,
};
use iotdash_mqtt::TopicRouter;
use parking_lot::Mutex;
use tracing::info;

/// Snapshot of everything the devices last reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Merged relay states.
    pub lighting: LightingState,
    /// Last energy sample.
    pub energy: Option<EnergyReading>,
    /// Last door lock event.
    pub door: Option<LockEvent>,
    /// Last gas sample.
    pub gas: Option<GasReading>,
    /// Last garden sample.
    pub garden: Option<GardenReading>,
    /// Irrigation relay.
    pub irrigation: Option<u8>,
    /// Camera frames received.
    pub camera_frames: u64,
}

/// Shared dashboard state updated from the router.
#[derive(Debug, Default)]
pub struct Dashboard {
    snapshot: Mutex<Snapshot>,
}

impl Dashboard {
    /// Build a router that feeds every topic in `topics` into this dashboard.
    pub fn router(self: &Arc<Self>, topics: &[String]) -> TopicRouter {
        let mut router = TopicRouter::new();
        for topic in topics {
            let dashboard = Arc::clone(self);
            router.register(topic.clone(), move |message: &DeviceMessage| {
                dashboard.apply(message);
            });
        }
        router
    }

    /// Fold one message into the snapshot.
    pub fn apply(&self, message: &DeviceMessage) {
        let mut snapshot = self.snapshot.lock();
        match message {
            DeviceMessage::Camera(frame) => {
                snapshot.camera_frames += 1;
                info!(has_picture = frame.picture.is_some(), "Camera frame");
            }
            DeviceMessage::Lighting(update) => {
                snapshot.lighting = snapshot.lighting.merge(*update);
                info!(lighting = ?snapshot.lighting, "Lighting state");
            }
            DeviceMessage::Energy(reading) => {
                info!(power = reading.power, voltage = reading.voltage, "Energy reading");
                snapshot.energy = Some(reading.clone());
            }
            DeviceMessage::DoorLock(event) => {
                info!(card = %event.card_id, status = %event.status, "Door lock event");
                snapshot.door = Some(event.clone());
            }
            DeviceMessage::KitchenGas(reading) => {
                info!(status = %reading.status, level = reading.gas_level, "Gas reading");
                snapshot.gas = Some(reading.clone());
            }
            DeviceMessage::GardenData(reading) => {
                info!(soil_moisture = reading.soil_moisture, "Garden reading");
                snapshot.garden = Some(reading.clone());
            }
            DeviceMessage::GardenControl(control) => {
                info!(relay = control.relay, "Irrigation state");
                snapshot.irrigation = Some(control.relay);
            }
            DeviceMessage::Other { topic, value } => {
                info!(topic, %value, "Message on untyped topic");
            }
        }
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.lock().clone()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let relay = |state: Option<u8>| match state {
            Some(0) => "off",
            Some(_) => "on",
            None => "?",
        };
        writeln!(
            f,
            "lights      relay1={} relay2={} relay3={}",
            relay(self.lighting.relay1),
            relay(self.lighting.relay2),
            relay(self.lighting.relay3)
        )?;
        match &self.energy {
            Some(e) => writeln!(
                f,
                "energy      {:.1} W  {:.1} V  {:.2} A  {:.1} °C  {:.0} %",
                e.power, e.voltage, e.current, e.temperature, e.humidity
            )?,
            None => writeln!(f, "energy      -")?,
        }
        match &self.door {
            Some(d) => writeln!(f, "door        {} ({})", d.status, d.card_id)?,
            None => writeln!(f, "door        -")?,
        }
        match &self.gas {
            Some(g) => writeln!(f, "gas         {} (level {})", g.status, g.gas_level)?,
            None => writeln!(f, "gas         -")?,
        }
        match &self.garden {
            Some(g) => writeln!(
                f,
                "garden      soil {}  {:.1} °C  {:.0} %  irrigation={}",
                g.soil_moisture,
                g.temperature,
                g.humidity,
                relay(self.irrigation)
            )?,
            None => writeln!(f, "garden      -  irrigation={}", relay(self.irrigation))?,
        }
        write!(f, "camera      {} frames", self.camera_frames)
    }
}
