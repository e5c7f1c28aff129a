//! Wyoming event framing
//!
//! A frame is a JSON header line, an optional JSON data block and an optional
//! binary payload. Only `audio-chunk` frames carry a payload.

pub mod codec;
pub mod event;

pub use codec::{decode, encode, read_frame, ProtocolError, MAX_BLOCK_LEN, MAX_HEADER_LEN};
pub use event::{
    AudioChunk, AudioFormat, AudioStart, AudioStop, Detect, Detection, ErrorEvent, Event, Ping,
    RunPipeline, Synthesize, SynthesizeVoice, Transcribe, Transcript,
};
