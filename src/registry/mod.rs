//! Session registry and result surface
//!
//! - `SessionRegistry`: device → live session table, trigger/cancel/get
//! - `ResultSink`: where completed results are published
//! - `ResultBoard`: in-memory per-device latest result

mod registry;
mod results;

pub use registry::SessionRegistry;
pub use results::{DeviceResult, ResultBoard, ResultSink};
