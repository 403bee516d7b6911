//! Runtime configuration: server, stream and encoder sections

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{FrameFormat, ServerFlavor, StreamMode};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub stream: StreamConfig,
    pub encoder: EncoderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(rename = "type")]
    pub flavor: ServerFlavor,
    pub host: String,
    /// Base port; Shoutcast sources use `port + 1`
    pub port: u16,
    /// Icecast mount point, without the leading slash
    pub mount: String,
    pub password: String,
    pub connect_attempts: u32,
    pub retry_delay_secs: u64,
    pub response_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            flavor: ServerFlavor::Icecast,
            host: "localhost".to_string(),
            port: 8000,
            mount: "stream".to_string(),
            password: "hackme".to_string(),
            connect_attempts: 5,
            retry_delay_secs: 10,
            response_timeout_ms: 5000,
        }
    }
}

impl ServerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Port the source connection dials
    pub fn source_port(&self) -> u16 {
        match self.flavor {
            ServerFlavor::Icecast => self.port,
            ServerFlavor::Shoutcast => self.port.saturating_add(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub mode: StreamMode,
    pub format: FrameFormat,
    /// Target server-side buffer in milliseconds
    pub buffer_ms: u64,
    pub update_metadata: bool,
    pub name: String,
    pub genre: String,
    pub url: String,
    pub description: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            mode: StreamMode::File,
            format: FrameFormat::Aac,
            buffer_ms: 5000,
            update_metadata: true,
            name: "streamcaster".to_string(),
            genre: String::new(),
            url: String::new(),
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AacProfile {
    Lc,
    He,
    Hev2,
}

impl AacProfile {
    pub const fn encoder_name(self) -> &'static str {
        match self {
            AacProfile::Lc => "aac_low",
            AacProfile::He => "aac_he",
            AacProfile::Hev2 => "aac_he_v2",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub path: PathBuf,
    /// Re-encode to the configured codec; otherwise copy the audio stream
    pub reencode: bool,
    pub aac_profile: AacProfile,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub channels: u8,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("ffmpeg"),
            reencode: true,
            aac_profile: AacProfile::Lc,
            bitrate_kbps: 128,
            sample_rate: 44100,
            channels: 2,
        }
    }
}

impl Config {
    /// Load a JSON config; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.is_empty() {
            return Err(ConfigError::Invalid("server host is empty".into()));
        }
        if self.server.connect_attempts == 0 {
            return Err(ConfigError::Invalid("connect_attempts must be at least 1".into()));
        }
        if self.server.flavor == ServerFlavor::Icecast && self.server.mount.trim_matches('/').is_empty() {
            return Err(ConfigError::Invalid("icecast needs a mount point".into()));
        }
        if self.stream.buffer_ms == 0 {
            return Err(ConfigError::Invalid("buffer_ms must be positive".into()));
        }
        if self.stream.mode == StreamMode::Transcode && !(1..=2).contains(&self.encoder.channels) {
            return Err(ConfigError::Invalid(format!(
                "encoder channels must be 1 or 2, got {}",
                self.encoder.channels
            )));
        }
        Ok(())
    }
}
