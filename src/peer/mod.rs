//! Connections to Wyoming peers (satellites and ASR/TTS/wake-word services)

mod connection;
mod endpoint;
mod pool;

pub use connection::{PeerConnection, PeerError};
pub use endpoint::{Endpoint, PeerRole};
pub use pool::BackendPool;
