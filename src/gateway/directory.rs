use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::config::Config;
use crate::peer::{Endpoint, PeerRole};

/// Wyoming addresses a device's pipeline runs against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEndpoints {
    pub satellite: Endpoint,
    pub asr: Endpoint,
    pub tts: Option<Endpoint>,
    pub wake: Option<Endpoint>,
}

impl DeviceEndpoints {
    pub fn new(satellite: Endpoint, asr: Endpoint) -> Self {
        Self {
            satellite,
            asr,
            tts: None,
            wake: None,
        }
    }

    pub fn with_tts(mut self, tts: Endpoint) -> Self {
        self.tts = Some(tts);
        self
    }

    /// Roles this device has an endpoint for
    pub fn roles(&self) -> Vec<PeerRole> {
        let mut roles = vec![PeerRole::Satellite, PeerRole::Asr];
        if self.tts.is_some() {
            roles.push(PeerRole::Tts);
        }
        if self.wake.is_some() {
            roles.push(PeerRole::WakeWord);
        }
        roles
    }
}

/// Device registry collaborator that maps device ids to Wyoming endpoints
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Resolve a device; `None` if unknown or missing a required endpoint
    async fn resolve(&self, device_id: &str) -> Option<DeviceEndpoints>;

    /// All resolvable device ids
    async fn device_ids(&self) -> Vec<String>;
}

/// Directory backed by the `devices` table of the config file
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    devices: BTreeMap<String, DeviceEndpoints>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge per-device entries with the default `services` endpoints
    pub fn from_config(config: &Config) -> Self {
        let mut directory = Self::new();

        for (device_id, device) in &config.devices {
            let Some(asr) = device.asr.clone().or_else(|| config.services.asr.clone()) else {
                warn!("Device {} has no ASR endpoint and no default is configured; skipping", device_id);
                continue;
            };

            directory.insert(
                device_id.clone(),
                DeviceEndpoints {
                    satellite: device.satellite.clone(),
                    asr,
                    tts: device.tts.clone().or_else(|| config.services.tts.clone()),
                    wake: device.wake.clone(),
                },
            );
        }

        directory
    }

    pub fn insert(&mut self, device_id: impl Into<String>, endpoints: DeviceEndpoints) {
        self.devices.insert(device_id.into(), endpoints);
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[async_trait]
impl DeviceDirectory for StaticDirectory {
    async fn resolve(&self, device_id: &str) -> Option<DeviceEndpoints> {
        self.devices.get(device_id).cloned()
    }

    async fn device_ids(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }
}
