use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::directory::{DeviceDirectory, DeviceEndpoints};
use crate::error::{Result, TriggerError};
use crate::peer::PeerRole;
use crate::registry::SessionRegistry;
use crate::session::TriggerOptions;

/// Longest accepted device identifier
const MAX_DEVICE_ID_LEN: usize = 128;

/// External "start listening now" request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub device_id: String,

    /// Optional ASR language override (e.g., "en-US")
    #[serde(default)]
    pub language: Option<String>,
}

impl TriggerRequest {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            language: None,
        }
    }
}

/// Synchronous acceptance of a trigger; the outcome is published later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerAccepted {
    pub session_id: Uuid,
    pub device_id: String,
}

/// Device listing entry
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub device_id: String,
    pub roles: Vec<PeerRole>,
    pub endpoints: DeviceEndpoints,
    pub busy: bool,
}

/// Entry point for external triggers
#[derive(Clone)]
pub struct TriggerGateway {
    directory: Arc<dyn DeviceDirectory>,
    registry: SessionRegistry,
}

impl TriggerGateway {
    pub fn new(directory: Arc<dyn DeviceDirectory>, registry: SessionRegistry) -> Self {
        Self { directory, registry }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Validate, resolve and hand off to the registry; returns once accepted
    pub async fn trigger(&self, request: TriggerRequest) -> Result<TriggerAccepted> {
        let device_id = validate_device_id(&request.device_id)?;

        let Some(endpoints) = self.directory.resolve(device_id).await else {
            warn!("Trigger rejected: unknown device {}", device_id);
            return Err(TriggerError::UnknownDevice(device_id.to_string()));
        };

        let options = TriggerOptions {
            language: request.language.filter(|language| !language.trim().is_empty()),
        };

        let session_id = self.registry.trigger(device_id, endpoints, options)?;
        info!("Accepted trigger for {} (session {})", device_id, session_id);

        Ok(TriggerAccepted {
            session_id,
            device_id: device_id.to_string(),
        })
    }

    /// Request cancellation; see [`SessionRegistry::cancel`]
    pub fn cancel(&self, session_id: Uuid) -> Result<bool> {
        self.registry.cancel(session_id)
    }

    /// All resolvable devices with their endpoints and busy flag
    pub async fn devices(&self) -> Vec<DeviceSummary> {
        let mut devices = Vec::new();
        for device_id in self.directory.device_ids().await {
            let Some(endpoints) = self.directory.resolve(&device_id).await else {
                continue;
            };
            let busy = self
                .registry
                .active_session(&device_id)
                .is_some_and(|snapshot| !snapshot.is_terminal());
            devices.push(DeviceSummary {
                roles: endpoints.roles(),
                device_id,
                endpoints,
                busy,
            });
        }
        devices
    }
}

/// Normalize a caller-supplied device id: trimmed, non-empty, plausible charset
pub(crate) fn validate_device_id(raw: &str) -> Result<&str> {
    let device_id = raw.trim();
    let plausible = !device_id.is_empty()
        && device_id.len() <= MAX_DEVICE_ID_LEN
        && device_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));

    if plausible {
        Ok(device_id)
    } else {
        Err(TriggerError::InvalidDevice(raw.to_string()))
    }
}
