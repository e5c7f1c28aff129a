use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role a Wyoming peer plays for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    Satellite,
    Asr,
    Tts,
    WakeWord,
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeerRole::Satellite => "satellite",
            PeerRole::Asr => "asr",
            PeerRole::Tts => "tts",
            PeerRole::WakeWord => "wakeword",
        };
        f.write_str(name)
    }
}

/// TCP address of a Wyoming peer (`tcp://host:port` or `host:port`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let addr = match trimmed.split_once("://") {
            Some(("tcp", rest)) => rest,
            Some((scheme, _)) => return Err(format!("unsupported scheme {:?} in {:?}", scheme, s)),
            None => trimmed,
        };

        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| format!("missing port in {:?}", s))?;
        if host.is_empty() {
            return Err(format!("missing host in {:?}", s));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("invalid port in {:?}: {}", s, e))?;

        Ok(Self::new(host.trim_start_matches('[').trim_end_matches(']'), port))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "tcp://[{}]:{}", self.host, self.port)
        } else {
            write!(f, "tcp://{}:{}", self.host, self.port)
        }
    }
}
