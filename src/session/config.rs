use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Settings shared by every triggered session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Language passed to the ASR service in `transcribe` (None = service default)
    pub language: Option<String>,

    /// Deadline for the transcript once audio-stop reached the ASR service
    /// Default: 10 seconds
    pub transcript_timeout: Duration,

    /// Pipeline name sent to the satellite in `run-pipeline`
    pub pipeline_name: Option<String>,

    /// Directory for raw WAV captures of streamed audio (None = no capture)
    pub capture_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            language: None,
            transcript_timeout: Duration::from_secs(10),
            pipeline_name: None,
            capture_dir: None,
        }
    }
}
