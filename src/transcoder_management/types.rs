//! Core types used by the transcoder subsystem.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::process_handle::ProcessHandle;

/// Event reported by a running transcoder process.
///
/// The start acknowledgment is the successful return of
/// [`Launcher::launch`](super::Launcher::launch); everything after that arrives as one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscoderEvent {
    /// Diagnostic output, for logging only.
    Progress { line: String },
    /// The process reported a failure. Always followed by `Exited`.
    Failed { reason: String },
    /// The process is gone.
    Exited { code: Option<i32> },
}

/// How a termination request should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateMode {
    /// Cooperative stop the process may handle (SIGTERM).
    Graceful,
    /// Unconditional kill.
    Forced,
}

/// Callback receiving the events of one process.
pub type EventSink = Arc<dyn Fn(TranscoderEvent) + Send + Sync>;

/// Future that watches a process until it exits.
pub type ProcessMonitor = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A freshly started process: its control handle plus the monitor future that still has to
/// be spawned by the caller.
///
/// Keeping the monitor unspawned lets the caller publish the handle before any event of the
/// process can be observed.
pub struct LaunchedProcess {
    pub handle: ProcessHandle,
    pub monitor: ProcessMonitor,
}
