use super::types::*;
use crate::error_handling::types::ConfigError;
use clap::Parser;
use log::{debug, info};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command-line arguments.
///
/// Every argument is optional: values given here (or through the matching environment
/// variable) take precedence over the configuration file, which in turn falls back to the
/// built-in defaults.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "streamgate")]
#[command(version)]
#[command(about = "RTSP to HLS stream gateway")]
pub struct CliArgs {
    /// Path to a TOML configuration file
    ///
    /// # Command Line
    /// Use `--config <FILE>` or the `STREAMGATE_CONFIG` environment variable
    #[arg(long, short, env = "STREAMGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port for the HTTP API and the WebSocket control channel
    #[arg(long, env = "STREAMGATE_PORT")]
    pub port: Option<u16>,

    /// IP address to bind the server to
    #[arg(long, env = "STREAMGATE_BIND_ADDRESS")]
    pub bind_address: Option<String>,

    /// Directory where the transcoder writes playlists and segments
    ///
    /// The directory is created at start-up if it does not exist
    #[arg(long, env = "STREAMGATE_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,
}

/// Application configuration.
///
/// # Fields Overview
///
/// - `server`: listener address and the connection ceiling
/// - `streams`: session ceiling, drain grace window and source address policy
/// - `transcoder`: values for the ffmpeg argument template
/// - `storage`: artifact directory and janitor schedule
/// - `liveness`: control channel probe interval
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub streams: StreamsConfig,
    pub transcoder: TranscoderConfig,
    pub storage: StorageConfig,
    pub liveness: LivenessConfig,
}

impl Config {
    /// Reads and parses a TOML configuration file. Missing keys take their default value.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    /// Builds the effective configuration from the command line: file first, then
    /// argument overrides, then validation.
    pub fn load(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => {
                info!("No configuration file given, using defaults");
                Self::default()
            }
        };
        config.apply_overrides(args);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(ref addr) = args.bind_address {
            self.server.bind_address = addr.clone();
        }
        if let Some(ref dir) = args.output_dir {
            self.storage.output_dir = dir.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_ip()?;
        if self.server.max_connections == 0 {
            return Err(ConfigError::NotInRange(
                "server.max_connections must be at least 1".to_string(),
            ));
        }
        if self.streams.max_streams == 0 {
            return Err(ConfigError::NotInRange(
                "streams.max_streams must be at least 1".to_string(),
            ));
        }
        if self.streams.grace_period_secs == 0 {
            return Err(ConfigError::NotInRange(
                "streams.grace_period_secs must be at least 1".to_string(),
            ));
        }
        if self.streams.allowed_schemes.is_empty() {
            return Err(ConfigError::MissingValue(
                "streams.allowed_schemes is empty".to_string(),
            ));
        }
        if self.streams.max_url_length == 0 {
            return Err(ConfigError::NotInRange(
                "streams.max_url_length must be at least 1".to_string(),
            ));
        }
        if self.transcoder.ffmpeg_path.trim().is_empty() {
            return Err(ConfigError::MissingValue(
                "transcoder.ffmpeg_path is empty".to_string(),
            ));
        }
        if self.storage.cleanup_interval_secs == 0 {
            return Err(ConfigError::NotInRange(
                "storage.cleanup_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.liveness.ping_interval_secs == 0 {
            return Err(ConfigError::NotInRange(
                "liveness.ping_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_ip(&self) -> Result<IpAddr, ConfigError> {
        self.server
            .bind_address
            .parse()
            .map_err(|_| ConfigError::BadIPFormatting(self.server.bind_address.clone()))
    }

    /// Creates the artifact directory if needed.
    pub fn ensure_output_dir(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.storage.output_dir).map_err(|e| {
            ConfigError::DirectoryDoesNotExist(format!(
                "{}: {}",
                self.storage.output_dir.display(),
                e
            ))
        })
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.streams.grace_period_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.liveness.ping_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.storage.retention_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.storage.cleanup_interval_secs)
    }
}
