use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::peer::Endpoint;
use crate::session::PipelineConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceConfig>,
    #[serde(default)]
    pub publish: PublishConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct PipelineSettings {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_transcript_timeout_secs")]
    pub transcript_timeout_secs: f64,
    #[serde(default)]
    pub pipeline_name: Option<String>,
    #[serde(default)]
    pub pool_backends: bool,
    #[serde(default = "default_max_idle_per_endpoint")]
    pub max_idle_per_endpoint: usize,
    #[serde(default)]
    pub capture_dir: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            language: None,
            transcript_timeout_secs: default_transcript_timeout_secs(),
            pipeline_name: None,
            pool_backends: false,
            max_idle_per_endpoint: default_max_idle_per_endpoint(),
            capture_dir: None,
        }
    }
}

impl PipelineSettings {
    pub fn to_pipeline_config(&self) -> Result<PipelineConfig> {
        let transcript_timeout = Duration::try_from_secs_f64(self.transcript_timeout_secs)
            .context("pipeline.transcript_timeout_secs must be a non-negative number")?;

        Ok(PipelineConfig {
            language: self.language.clone(),
            transcript_timeout,
            pipeline_name: self.pipeline_name.clone(),
            capture_dir: self.capture_dir.clone(),
        })
    }

    /// Idle connections kept per backend endpoint (0 = no pooling)
    pub fn pool_size(&self) -> usize {
        if self.pool_backends {
            self.max_idle_per_endpoint
        } else {
            0
        }
    }
}

/// Default backend services for devices that do not name their own
#[derive(Debug, Default, Deserialize)]
pub struct ServicesConfig {
    pub asr: Option<Endpoint>,
    pub tts: Option<Endpoint>,
}

#[derive(Debug, Deserialize)]
pub struct DeviceConfig {
    pub satellite: Endpoint,
    pub asr: Option<Endpoint>,
    pub tts: Option<Endpoint>,
    pub wake: Option<Endpoint>,
}

#[derive(Debug, Deserialize)]
pub struct PublishConfig {
    /// NATS server URL; results are only published to NATS when set
    pub nats_url: Option<String>,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            nats_url: None,
            subject_prefix: default_subject_prefix(),
        }
    }
}

fn default_transcript_timeout_secs() -> f64 {
    10.0
}

fn default_max_idle_per_endpoint() -> usize {
    2
}

fn default_subject_prefix() -> String {
    "wyoming.trigger.result".to_string()
}

impl Config {
    /// Load `path` (any format the `config` crate understands) with
    /// `WYOMING_TRIGGER__*` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("WYOMING_TRIGGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config {}", path))?;

        settings
            .try_deserialize()
            .with_context(|| format!("Invalid config {}", path))
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
