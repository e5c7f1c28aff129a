use serde::{Deserialize, Serialize};

use crate::session::{SessionOutcome, SessionSnapshot};

/// Session result message published to NATS
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResultMessage {
    pub session_id: String,
    pub device_id: String,
    pub outcome: SessionOutcome,
    pub text: String,
    pub error: Option<String>,
    pub started_at: String,  // RFC3339 timestamp
    pub finished_at: String, // RFC3339 timestamp
    pub duration_secs: f64,
}

impl SessionResultMessage {
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Option<Self> {
        let finished_at = snapshot.finished_at?;

        Some(Self {
            session_id: snapshot.session_id.to_string(),
            device_id: snapshot.device_id.clone(),
            outcome: snapshot.outcome?,
            text: snapshot.transcript.clone(),
            error: snapshot.error.clone(),
            started_at: snapshot.started_at.to_rfc3339(),
            finished_at: finished_at.to_rfc3339(),
            duration_secs: snapshot.duration_secs(),
        })
    }
}
