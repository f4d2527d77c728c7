use serde::Deserialize;
use std::path::PathBuf;

/// HTTP and control channel listener settings.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Live control connections above this count are refused.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: String::from("0.0.0.0"),
            port: 3000,
            max_connections: 100,
        }
    }
}

/// Session admission and teardown policy.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct StreamsConfig {
    pub max_streams: usize,
    pub grace_period_secs: u64,
    pub allowed_schemes: Vec<String>,
    pub max_url_length: usize,
    /// Hide the user-info part of source addresses in listings.
    pub mask_credentials: bool,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            max_streams: 10,
            grace_period_secs: 5,
            allowed_schemes: vec![String::from("rtsp"), String::from("rtsps")],
            max_url_length: 2048,
            mask_credentials: true,
        }
    }
}

/// Values substituted into the fixed ffmpeg argument template.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    pub ffmpeg_path: String,
    pub rtsp_transport: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: String,
    pub tune: String,
    pub resolution: String,
    pub frame_rate: u32,
    pub segment_secs: u32,
    pub playlist_size: u32,
    pub start_number: u32,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: String::from("ffmpeg"),
            rtsp_transport: String::from("tcp"),
            video_codec: String::from("libx264"),
            audio_codec: String::from("aac"),
            preset: String::from("veryfast"),
            tune: String::from("zerolatency"),
            resolution: String::from("1280x720"),
            frame_rate: 25,
            segment_secs: 2,
            playlist_size: 5,
            start_number: 0,
        }
    }
}

/// Artifact directory and janitor schedule.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
    pub retention_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("/tmp/streamgate/hls"),
            retention_secs: 300,
            cleanup_interval_secs: 60,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub ping_interval_secs: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 30,
        }
    }
}
