//! Runtime configuration: a TOML file with command-line and environment overrides.

pub mod config;
pub mod types;

pub use config::{CliArgs, Config};
pub use types::{LivenessConfig, ServerConfig, StorageConfig, StreamsConfig, TranscoderConfig};
