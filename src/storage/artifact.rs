//! Artifact naming and metadata.
//!
//! Every file the transcoder writes is prefixed by its session id: `<id>.m3u8` for the
//! manifest and `<id>-<token>` for segments. Nothing else scopes concurrent sessions sharing
//! the output directory.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::error_handling::types::StorageError;
use crate::session_management::SessionId;

pub const PLAYLIST_EXTENSION: &str = "m3u8";
pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

static SEGMENT_TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{1,32}\.ts$").expect("segment token pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Manifest,
    Segment,
    Other,
}

/// A file found in the output directory.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub file_name: String,
    pub kind: ArtifactKind,
    pub size: u64,
    pub written_at: DateTime<Utc>,
}

pub fn playlist_file_name(session_id: &SessionId) -> String {
    format!("{}.{}", session_id, PLAYLIST_EXTENSION)
}

/// ffmpeg `-hls_segment_filename` pattern for the session.
pub fn segment_file_pattern(session_id: &SessionId) -> String {
    format!("{}-%03d.ts", session_id)
}

/// Checks that `token` is a plain segment file name component and returns the full name.
pub fn segment_file_name(session_id: &SessionId, token: &str) -> Result<String, StorageError> {
    if !SEGMENT_TOKEN_PATTERN.is_match(token) {
        return Err(StorageError::InvalidName(token.to_string()));
    }
    Ok(format!("{}-{}", session_id, token))
}

/// Whether `file_name` belongs to `session_id`.
pub fn belongs_to(file_name: &str, session_id: &SessionId) -> bool {
    match file_name.strip_prefix(session_id.as_str()) {
        Some(rest) => rest.starts_with('.') || rest.starts_with('-'),
        None => false,
    }
}

pub fn classify(file_name: &str) -> ArtifactKind {
    if file_name.ends_with(".m3u8") {
        ArtifactKind::Manifest
    } else if file_name.ends_with(".ts") {
        ArtifactKind::Segment
    } else {
        ArtifactKind::Other
    }
}
