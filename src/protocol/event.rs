use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::codec::ProtocolError;

/// Audio format shared by `audio-start` and `audio-chunk`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub rate: u32,
    /// Bytes per sample
    pub width: u16,
    /// Number of channels
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            rate: 16000, // 16kHz for ASR
            width: 2,    // 16-bit PCM
            channels: 1, // Mono
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPipeline {
    pub start_stage: String,
    pub end_stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_on_end: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcribe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizeVoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synthesize {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<SynthesizeVoice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioStart {
    #[serde(flatten)]
    pub format: AudioFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

/// One chunk of opaque PCM audio; `audio` travels as the frame payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioChunk {
    #[serde(flatten)]
    pub format: AudioFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(skip)]
    pub audio: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioStop {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A Wyoming event, one variant per recognized `type` tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    RunSatellite,
    RunPipeline(RunPipeline),
    Transcribe(Transcribe),
    Transcript(Transcript),
    Synthesize(Synthesize),
    AudioStart(AudioStart),
    AudioChunk(AudioChunk),
    AudioStop(AudioStop),
    Detect(Detect),
    Detection(Detection),
    Played,
    Error(ErrorEvent),
    Ping(Ping),
    Pong(Ping),
    Describe,
}

impl Event {
    /// Wire `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::RunSatellite => "run-satellite",
            Event::RunPipeline(_) => "run-pipeline",
            Event::Transcribe(_) => "transcribe",
            Event::Transcript(_) => "transcript",
            Event::Synthesize(_) => "synthesize",
            Event::AudioStart(_) => "audio-start",
            Event::AudioChunk(_) => "audio-chunk",
            Event::AudioStop(_) => "audio-stop",
            Event::Detect(_) => "detect",
            Event::Detection(_) => "detection",
            Event::Played => "played",
            Event::Error(_) => "error",
            Event::Ping(_) => "ping",
            Event::Pong(_) => "pong",
            Event::Describe => "describe",
        }
    }

    /// Whether frames of this type carry a binary payload
    pub fn carries_payload(event_type: &str) -> bool {
        event_type == "audio-chunk"
    }

    pub fn is_recognized(event_type: &str) -> bool {
        matches!(
            event_type,
            "run-satellite"
                | "run-pipeline"
                | "transcribe"
                | "transcript"
                | "synthesize"
                | "audio-start"
                | "audio-chunk"
                | "audio-stop"
                | "detect"
                | "detection"
                | "played"
                | "error"
                | "ping"
                | "pong"
                | "describe"
        )
    }

    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Event::AudioChunk(chunk) => Some(&chunk.audio),
            _ => None,
        }
    }

    /// Header data fields for this event
    pub fn data(&self) -> Result<Map<String, Value>, ProtocolError> {
        let value = match self {
            Event::RunSatellite | Event::Played | Event::Describe => return Ok(Map::new()),
            Event::RunPipeline(e) => serde_json::to_value(e),
            Event::Transcribe(e) => serde_json::to_value(e),
            Event::Transcript(e) => serde_json::to_value(e),
            Event::Synthesize(e) => serde_json::to_value(e),
            Event::AudioStart(e) => serde_json::to_value(e),
            Event::AudioChunk(e) => serde_json::to_value(e),
            Event::AudioStop(e) => serde_json::to_value(e),
            Event::Detect(e) => serde_json::to_value(e),
            Event::Detection(e) => serde_json::to_value(e),
            Event::Error(e) => serde_json::to_value(e),
            Event::Ping(e) | Event::Pong(e) => serde_json::to_value(e),
        }
        .map_err(|e| ProtocolError::MalformedFrame(format!("unencodable {}: {}", self.event_type(), e)))?;

        match value {
            Value::Object(map) => Ok(map),
            other => Err(ProtocolError::MalformedFrame(format!(
                "{} data is not an object: {}",
                self.event_type(),
                other
            ))),
        }
    }

    /// Build a typed event from a decoded tag, data map and payload
    pub fn from_parts(
        event_type: &str,
        data: Map<String, Value>,
        payload: Option<Vec<u8>>,
    ) -> Result<Self, ProtocolError> {
        if !Self::is_recognized(event_type) {
            return Err(ProtocolError::UnknownType(event_type.to_string()));
        }

        // An audio-chunk without payload_length carries empty audio
        if payload.is_some() && !Self::carries_payload(event_type) {
            return Err(ProtocolError::MalformedFrame(format!(
                "unexpected payload on {} frame",
                event_type
            )));
        }

        let data = Value::Object(data);
        let event = match event_type {
            "run-satellite" => Event::RunSatellite,
            "run-pipeline" => Event::RunPipeline(fields(event_type, data)?),
            "transcribe" => Event::Transcribe(fields(event_type, data)?),
            "transcript" => Event::Transcript(fields(event_type, data)?),
            "synthesize" => Event::Synthesize(fields(event_type, data)?),
            "audio-start" => Event::AudioStart(fields(event_type, data)?),
            "audio-chunk" => {
                let mut chunk: AudioChunk = fields(event_type, data)?;
                chunk.audio = payload.unwrap_or_default();
                Event::AudioChunk(chunk)
            }
            "audio-stop" => Event::AudioStop(fields(event_type, data)?),
            "detect" => Event::Detect(fields(event_type, data)?),
            "detection" => Event::Detection(fields(event_type, data)?),
            "played" => Event::Played,
            "error" => Event::Error(fields(event_type, data)?),
            "ping" => Event::Ping(fields(event_type, data)?),
            "pong" => Event::Pong(fields(event_type, data)?),
            "describe" => Event::Describe,
            other => return Err(ProtocolError::UnknownType(other.to_string())),
        };

        Ok(event)
    }
}

fn fields<T: serde::de::DeserializeOwned>(event_type: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data)
        .map_err(|e| ProtocolError::MalformedFrame(format!("bad {} data: {}", event_type, e)))
}
