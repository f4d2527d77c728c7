//! Session management core module.
//!
//! This module owns everything about live transcoding sessions: id allocation, source
//! address validation, the in-memory registry and the lifecycle controller that drives each
//! session from start request to cleanup.

use serde::Serialize;
use std::fmt;

/// In-memory table of live sessions.
pub mod registry;
/// Session data structures and identifiers.
pub mod session;
/// Lifecycle controller running as a single-owner actor.
pub mod session_manager;
/// Events, notifications and the notifier seam.
pub mod types;
/// Source address policy.
pub mod validation;

pub use registry::StreamRegistry;
pub use session::{Session, SessionId, SessionSummary};
pub use session_manager::{SessionManager, SessionManagerHandle};
pub use types::{ConnectionId, Notifier, SessionNotification};
pub use validation::{mask_credentials, validate_source, SourcePolicy};

/// Lifecycle state of a session.
///
/// `Requested -> Spawning -> Active -> Draining -> Terminated`. A session can also jump
/// from `Spawning` straight to `Terminated` when the transcoder fails to start, and from
/// `Active` to `Terminated` when the process ends or fails on its own. `Terminated` is never
/// stored: the registry entry is removed in the same step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Requested,
    Spawning,
    Active,
    Draining,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Requested => "requested",
            SessionState::Spawning => "spawning",
            SessionState::Active => "active",
            SessionState::Draining => "draining",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}
