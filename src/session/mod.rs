//! Triggered pipeline sessions
//!
//! This module provides the `Session` state machine that drives one
//! wake-word-free interaction:
//! - Asking the satellite to stream audio straight into the ASR stage
//! - Relaying audio chunks, in order, to the ASR service
//! - Waiting (bounded) for the transcript
//! - Relaying the transcript and optional TTS audio back to the satellite

mod config;
mod session;
mod snapshot;

pub use config::PipelineConfig;
pub use session::{Session, TriggerOptions};
pub use snapshot::{SessionOutcome, SessionSnapshot, SessionState};
