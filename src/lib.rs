pub mod audio;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod nats;
pub mod peer;
pub mod protocol;
pub mod registry;
pub mod session;

pub use audio::AudioCapture;
pub use config::Config;
pub use error::TriggerError;
pub use gateway::{
    DeviceDirectory, DeviceEndpoints, StaticDirectory, TriggerAccepted, TriggerGateway, TriggerRequest,
};
pub use http::{create_router, AppState};
pub use nats::{NatsResultPublisher, SessionResultMessage};
pub use peer::{BackendPool, Endpoint, PeerConnection, PeerError, PeerRole};
pub use protocol::{Event, ProtocolError};
pub use registry::{DeviceResult, ResultBoard, ResultSink, SessionRegistry};
pub use session::{PipelineConfig, SessionOutcome, SessionSnapshot, SessionState, TriggerOptions};
