use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

use crate::session::{SessionOutcome, SessionSnapshot};

/// Destination for completed session results
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Publish one terminal snapshot
    async fn publish(&self, result: &SessionSnapshot) -> Result<()>;

    /// Sink name for logging
    fn name(&self) -> &str;
}

/// Latest outcome for one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceResult {
    pub device_id: String,
    pub session_id: Uuid,
    pub outcome: SessionOutcome,
    /// Recognized text; empty when nothing was recognized
    pub text: String,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceResult {
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Option<Self> {
        Some(Self {
            device_id: snapshot.device_id.clone(),
            session_id: snapshot.session_id,
            outcome: snapshot.outcome?,
            text: snapshot.transcript.clone(),
            error: snapshot.error.clone(),
            updated_at: snapshot.finished_at.unwrap_or_else(Utc::now),
        })
    }

    pub fn is_error(&self) -> bool {
        self.outcome != SessionOutcome::Success
    }
}

/// In-memory per-device result surface, read by the host
#[derive(Debug, Default)]
pub struct ResultBoard {
    results: RwLock<HashMap<String, DeviceResult>>,
}

impl ResultBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent result for `device_id`, if any session completed
    pub fn get(&self, device_id: &str) -> Option<DeviceResult> {
        self.results
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_id)
            .cloned()
    }

    pub fn all(&self) -> Vec<DeviceResult> {
        let mut results: Vec<DeviceResult> = self
            .results
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        results.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        results
    }
}

#[async_trait]
impl ResultSink for ResultBoard {
    async fn publish(&self, result: &SessionSnapshot) -> Result<()> {
        let Some(entry) = DeviceResult::from_snapshot(result) else {
            anyhow::bail!("session {} has no outcome yet", result.session_id);
        };

        self.results
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.device_id.clone(), entry);
        Ok(())
    }

    fn name(&self) -> &str {
        "result-board"
    }
}
