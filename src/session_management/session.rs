use crate::session_management::types::ConnectionId;
use crate::session_management::SessionState;
use crate::transcoder_management::ProcessHandle;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

static SESSION_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^stream_[0-9]+_[0-9a-f]{8}$").expect("session id pattern is valid"));

/// Opaque session token of the form `stream_<unix-millis>_<8 hex chars>`.
///
/// Ids only contain ASCII alphanumerics and `_`, so they can be used directly as a file name
/// prefix for the session's artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let random = Uuid::new_v4().simple().to_string();
        SessionId(format!(
            "stream_{}_{}",
            Utc::now().timestamp_millis(),
            &random[..8]
        ))
    }

    /// Accepts only strings shaped like a generated id.
    pub fn parse(raw: &str) -> Option<Self> {
        if SESSION_ID_PATTERN.is_match(raw) {
            Some(SessionId(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One live source-to-HLS conversion.
pub struct Session {
    pub id: SessionId,
    /// Validated source address, exactly as the client sent it.
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub state: SessionState,
    /// Set once the spawn completes.
    pub process: Option<ProcessHandle>,
    pub viewers: HashSet<ConnectionId>,
    /// Forced-kill timer, armed while draining.
    pub drain_timer: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(id: SessionId, source: String, viewer: ConnectionId) -> Self {
        let mut viewers = HashSet::new();
        viewers.insert(viewer);
        Self {
            id,
            source,
            created_at: Utc::now(),
            state: SessionState::Requested,
            process: None,
            viewers,
            drain_timer: None,
        }
    }

    pub fn cancel_drain_timer(&mut self) {
        if let Some(timer) = self.drain_timer.take() {
            timer.abort();
        }
    }
}

/// Entry of the administrative stream listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub source_address: String,
    pub viewer_count: usize,
    pub started_at: DateTime<Utc>,
    pub age_ms: i64,
    pub status: SessionState,
}
