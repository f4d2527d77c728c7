//! Fakes shared by tests that need a running session manager.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error_handling::types::TranscoderError;
use crate::session_management::session_manager::{ManagerSettings, SessionManager};
use crate::session_management::{
    ConnectionId, Notifier, SessionId, SessionManagerHandle, SessionNotification,
};
use crate::storage::ArtifactStorage;
use crate::transcoder_management::{EventSink, LaunchedProcess, Launcher, ProcessHandle};

/// Starts processes that run until asked to stop, without touching the OS.
pub struct IdleLauncher;

impl Launcher for IdleLauncher {
    fn launch(
        &self,
        _session_id: &SessionId,
        source: &str,
        _sink: EventSink,
    ) -> Result<LaunchedProcess, TranscoderError> {
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();
        Ok(LaunchedProcess {
            handle: ProcessHandle::new(None, format!("ffmpeg -i {}", source), control_tx),
            monitor: Box::pin(async move { while control_rx.recv().await.is_some() {} }),
        })
    }
}

pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _: ConnectionId, _: SessionNotification) {}
}

/// Runs a manager with [`IdleLauncher`] and returns its handle.
pub fn spawn_manager(
    storage: Arc<dyn ArtifactStorage>,
    notifier: Arc<dyn Notifier>,
) -> SessionManagerHandle {
    let manager = SessionManager::new(
        ManagerSettings::default(),
        Arc::new(IdleLauncher),
        storage,
        notifier,
    );
    let handle = manager.handle();
    tokio::spawn(manager.run());
    handle
}
