use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Stage of one triggered interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Triggered,
    StreamingAudio,
    AwaitingTranscript,
    Responding,
    Success,
    Disconnected,
    BackendError,
    Timeout,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        self.outcome().is_some()
    }

    pub fn outcome(self) -> Option<SessionOutcome> {
        match self {
            SessionState::Success => Some(SessionOutcome::Success),
            SessionState::Disconnected => Some(SessionOutcome::Disconnected),
            SessionState::BackendError => Some(SessionOutcome::BackendError),
            SessionState::Timeout => Some(SessionOutcome::Timeout),
            SessionState::Cancelled => Some(SessionOutcome::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Triggered => "triggered",
            SessionState::StreamingAudio => "streaming_audio",
            SessionState::AwaitingTranscript => "awaiting_transcript",
            SessionState::Responding => "responding",
            SessionState::Success => "success",
            SessionState::Disconnected => "disconnected",
            SessionState::BackendError => "backend_error",
            SessionState::Timeout => "timeout",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Terminal result of a session, set exactly once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionOutcome {
    Success,
    Disconnected,
    BackendError,
    Timeout,
    Cancelled,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,

    pub device_id: String,

    pub state: SessionState,

    /// Recognized text; only ever appended to
    pub transcript: String,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,

    pub outcome: Option<SessionOutcome>,

    /// Human-readable failure detail for non-success outcomes
    pub error: Option<String>,

    /// WAV capture of the streamed audio, if capture is enabled
    pub audio_path: Option<PathBuf>,

    /// Audio chunks relayed from the satellite to ASR
    pub chunks_forwarded: usize,
}

impl SessionSnapshot {
    pub fn new(session_id: Uuid, device_id: impl Into<String>) -> Self {
        Self {
            session_id,
            device_id: device_id.into(),
            state: SessionState::Triggered,
            transcript: String::new(),
            started_at: Utc::now(),
            finished_at: None,
            outcome: None,
            error: None,
            audio_path: None,
            chunks_forwarded: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Elapsed time until completion (or until now while in flight)
    pub fn duration_secs(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        end.signed_duration_since(self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
