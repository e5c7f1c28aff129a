//! Caller-facing error types

use thiserror::Error;
use uuid::Uuid;

pub use crate::peer::PeerError;
pub use crate::protocol::ProtocolError;

/// Result type alias for trigger/cancel operations
pub type Result<T> = std::result::Result<T, TriggerError>;

/// Rejections at the gateway/registry boundary; no session is created
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    /// Device id is empty or not a plausible identifier
    #[error("invalid device id: {0:?}")]
    InvalidDevice(String),

    /// No endpoint information resolvable for the device
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// Device already has a non-terminal session
    #[error("device {device_id} already has active session {session_id}")]
    AlreadyActive { device_id: String, session_id: Uuid },

    /// No live or recently completed session with this id
    #[error("unknown session: {0}")]
    UnknownSession(Uuid),
}
