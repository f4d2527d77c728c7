use crate::error_handling::types::{SessionError, TranscoderError};
use crate::session_management::session::{SessionId, SessionSummary};
use crate::transcoder_management::{ProcessHandle, TranscoderEvent};
use tokio::sync::oneshot;

/// Identifier of a client control connection.
pub type ConnectionId = u64;

/// Lifecycle notification addressed to one connection.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
    Started { session_id: SessionId },
    Ended { session_id: SessionId },
    Stopped { session_id: SessionId },
    Error {
        session_id: Option<SessionId>,
        message: String,
    },
}

/// Outbound side of the lifecycle controller.
///
/// Implementations must not block: they are called from the serialized control path.
pub trait Notifier: Send + Sync {
    fn notify(&self, connection_id: ConnectionId, notification: SessionNotification);
}

/// Everything the lifecycle controller reacts to, in arrival order.
///
/// Client requests, process events and timer expiries share this one type so that every
/// mutation of the registry happens on the same task.
pub enum ControlEvent {
    StartStream {
        connection_id: ConnectionId,
        source: String,
        reply: oneshot::Sender<Result<SessionId, SessionError>>,
    },
    StopStream {
        connection_id: ConnectionId,
        session_id: SessionId,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    ConnectionClosed {
        connection_id: ConnectionId,
        reply: oneshot::Sender<()>,
    },
    Spawned {
        session_id: SessionId,
        result: Result<ProcessHandle, TranscoderError>,
    },
    Process {
        session_id: SessionId,
        event: TranscoderEvent,
    },
    DrainExpired {
        session_id: SessionId,
    },
    IsLive {
        session_id: SessionId,
        reply: oneshot::Sender<bool>,
    },
    ListSessions {
        reply: oneshot::Sender<Vec<SessionSummary>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}
