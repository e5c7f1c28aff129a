//! Trigger gateway and device endpoint resolution

mod directory;
mod gateway;

pub use directory::{DeviceDirectory, DeviceEndpoints, StaticDirectory};
pub(crate) use gateway::validate_device_id;
pub use gateway::{DeviceSummary, TriggerAccepted, TriggerGateway, TriggerRequest};
