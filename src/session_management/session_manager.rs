//! Session lifecycle controller.
//!
//! The [`SessionManager`] runs as a single task that owns the [`StreamRegistry`]. Client
//! requests arrive through a [`SessionManagerHandle`]; process events and drain timer
//! expiries are fed back into the same channel, so every state change is serialized.
//!
//! # Lifecycle
//!
//! - A valid start request inserts the session as `spawning` and launches the transcoder on
//!   a separate task. The id is returned to the caller right away.
//! - The launch result comes back as [`ControlEvent::Spawned`]. Success makes the session
//!   `active` and notifies its viewers; failure reports an error and removes it.
//! - When the last viewer leaves, the session turns `draining`: the process gets a graceful
//!   stop and a timer bounded by the grace period is armed. Whichever comes first, process
//!   exit or timer expiry, terminates the session. Expiry force-kills the process.
//! - Terminating removes the registry entry and purges the session's artifacts.
//!
//! A draining session never goes back to `active`. A new start request for the same source
//! creates a new session.

use log::{debug, error, info, trace, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::configuration::Config;
use crate::error_handling::types::{SessionError, TranscoderError};
use crate::session_management::registry::StreamRegistry;
use crate::session_management::session::{Session, SessionId, SessionSummary};
use crate::session_management::types::{
    ConnectionId, ControlEvent, Notifier, SessionNotification,
};
use crate::session_management::validation::{mask_credentials, validate_source, SourcePolicy};
use crate::session_management::SessionState;
use crate::storage::ArtifactStorage;
use crate::transcoder_management::{
    EventSink, LaunchedProcess, Launcher, ProcessHandle, TerminateMode, TranscoderEvent,
};

/// Limits and policies applied by the lifecycle controller.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub policy: SourcePolicy,
    pub max_streams: usize,
    pub grace_period: Duration,
    pub mask_credentials: bool,
}

impl ManagerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            policy: SourcePolicy::from_config(&config.streams),
            max_streams: config.streams.max_streams,
            grace_period: config.grace_period(),
            mask_credentials: config.streams.mask_credentials,
        }
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct SessionManager {
    registry: StreamRegistry,
    settings: ManagerSettings,
    launcher: Arc<dyn Launcher>,
    storage: Arc<dyn ArtifactStorage>,
    notifier: Arc<dyn Notifier>,
    events_tx: mpsc::UnboundedSender<ControlEvent>,
    events_rx: mpsc::UnboundedReceiver<ControlEvent>,
    purges: Vec<JoinHandle<()>>,
}

impl SessionManager {
    pub fn new(
        settings: ManagerSettings,
        launcher: Arc<dyn Launcher>,
        storage: Arc<dyn ArtifactStorage>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            registry: StreamRegistry::new(),
            settings,
            launcher,
            storage,
            notifier,
            events_tx,
            events_rx,
            purges: Vec::new(),
        }
    }

    pub fn handle(&self) -> SessionManagerHandle {
        SessionManagerHandle {
            tx: self.events_tx.clone(),
        }
    }

    /// Processes events until a shutdown request.
    pub async fn run(mut self) {
        info!(
            "Session manager running (max {} streams, grace {}s)",
            self.settings.max_streams,
            self.settings.grace_period.as_secs()
        );
        while let Some(event) = self.events_rx.recv().await {
            if let ControlEvent::Shutdown { reply } = event {
                self.shutdown().await;
                let _ = reply.send(());
                break;
            }
            self.handle_event(event);
        }
        info!("Session manager stopped");
    }

    fn handle_event(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::StartStream {
                connection_id,
                source,
                reply,
            } => {
                let result = self.start_stream(connection_id, source);
                let _ = reply.send(result);
            }
            ControlEvent::StopStream {
                connection_id,
                session_id,
                reply,
            } => {
                let result = self.stop_stream(connection_id, &session_id);
                let _ = reply.send(result);
            }
            ControlEvent::ConnectionClosed {
                connection_id,
                reply,
            } => {
                self.connection_closed(connection_id);
                let _ = reply.send(());
            }
            ControlEvent::Spawned { session_id, result } => self.on_spawned(&session_id, result),
            ControlEvent::Process { session_id, event } => {
                self.on_process_event(&session_id, event)
            }
            ControlEvent::DrainExpired { session_id } => self.on_drain_expired(&session_id),
            ControlEvent::IsLive { session_id, reply } => {
                let _ = reply.send(self.registry.contains(&session_id));
            }
            ControlEvent::ListSessions { reply } => {
                let _ = reply.send(self.registry.summaries(self.settings.mask_credentials));
            }
            ControlEvent::Shutdown { reply } => {
                // Only reachable when driven without `run`.
                warn!("Shutdown requested outside the run loop");
                let _ = reply.send(());
            }
        }
    }

    fn start_stream(
        &mut self,
        connection_id: ConnectionId,
        source: String,
    ) -> Result<SessionId, SessionError> {
        if let Err(e) = validate_source(&source, &self.settings.policy) {
            warn!("[conn {}] Rejected source: {}", connection_id, e.reason);
            return Err(e.into());
        }
        if self.registry.len() >= self.settings.max_streams {
            warn!(
                "[conn {}] Stream limit reached ({})",
                connection_id, self.settings.max_streams
            );
            return Err(SessionError::CapacityReached(self.settings.max_streams));
        }

        let session_id = SessionId::generate();
        let mut session = Session::new(session_id.clone(), source.clone(), connection_id);
        session.state = SessionState::Spawning;
        self.registry.insert(session);
        info!(
            "[{}] Session requested by connection {} for {}",
            session_id,
            connection_id,
            mask_credentials(&source)
        );

        self.spawn_launch(session_id.clone(), source);
        Ok(session_id)
    }

    /// Launches the process off the control path. `Spawned` is always delivered before any
    /// event of the process, because the monitor only starts once it has been sent.
    fn spawn_launch(&self, session_id: SessionId, source: String) {
        let launcher = self.launcher.clone();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let sink = event_sink(events_tx.clone(), session_id.clone());
            match launcher.launch(&session_id, &source, sink) {
                Ok(LaunchedProcess { handle, monitor }) => {
                    let spawned = ControlEvent::Spawned {
                        session_id,
                        result: Ok(handle),
                    };
                    // If the manager is gone the monitor is dropped, which kills the child.
                    if events_tx.send(spawned).is_ok() {
                        tokio::spawn(monitor);
                    }
                }
                Err(e) => {
                    let _ = events_tx.send(ControlEvent::Spawned {
                        session_id,
                        result: Err(e),
                    });
                }
            }
        });
    }

    fn stop_stream(
        &mut self,
        connection_id: ConnectionId,
        session_id: &SessionId,
    ) -> Result<(), SessionError> {
        let remaining = self
            .registry
            .detach_viewer(session_id, connection_id)
            .ok_or_else(|| {
                debug!(
                    "[conn {}] Stop for unknown or foreign session {}",
                    connection_id, session_id
                );
                SessionError::NotFound(session_id.to_string())
            })?;

        info!(
            "[{}] Connection {} stopped viewing ({} viewer(s) left)",
            session_id, connection_id, remaining
        );
        self.notifier.notify(
            connection_id,
            SessionNotification::Stopped {
                session_id: session_id.clone(),
            },
        );
        if remaining == 0 {
            self.begin_drain(session_id);
        }
        Ok(())
    }

    fn connection_closed(&mut self, connection_id: ConnectionId) {
        let joined = self.registry.sessions_viewed_by(connection_id);
        if joined.is_empty() {
            return;
        }
        debug!(
            "[conn {}] Closed, detaching from {} session(s)",
            connection_id,
            joined.len()
        );
        for session_id in joined {
            if self.registry.detach_viewer(&session_id, connection_id) == Some(0) {
                self.begin_drain(&session_id);
            }
        }
    }

    fn on_spawned(&mut self, session_id: &SessionId, result: Result<ProcessHandle, TranscoderError>) {
        let Some(session) = self.registry.get_mut(session_id) else {
            if let Ok(handle) = result {
                warn!("[{}] Spawned after the session ended, killing it", session_id);
                handle.terminate(TerminateMode::Forced);
            }
            return;
        };

        match result {
            Ok(handle) => {
                debug!("[{}] Transcoder running: {}", session_id, handle.command_line);
                if session.state == SessionState::Draining {
                    // Everyone left while the process was starting.
                    handle.terminate(TerminateMode::Graceful);
                    session.process = Some(handle);
                    return;
                }
                session.process = Some(handle);
                session.state = SessionState::Active;
                info!("[{}] Session active", session_id);
                let viewers: Vec<ConnectionId> = session.viewers.iter().copied().collect();
                for connection_id in viewers {
                    self.notifier.notify(
                        connection_id,
                        SessionNotification::Started {
                            session_id: session_id.clone(),
                        },
                    );
                }
            }
            Err(e) => {
                error!("[{}] Transcoder failed to start: {}", session_id, e);
                let message = SessionError::Spawn(e).client_message();
                self.notify_viewers(session_id, |id| SessionNotification::Error {
                    session_id: Some(id),
                    message: message.clone(),
                });
                self.finish(session_id);
            }
        }
    }

    fn on_process_event(&mut self, session_id: &SessionId, event: TranscoderEvent) {
        let Some(state) = self.registry.get(session_id).map(|s| s.state) else {
            trace!("[{}] Event for finished session: {:?}", session_id, event);
            return;
        };

        match event {
            TranscoderEvent::Progress { line } => debug!("[{}] {}", session_id, line),
            TranscoderEvent::Failed { reason } => {
                if state == SessionState::Draining {
                    // Expected outcome of the stop signal.
                    debug!("[{}] Transcoder stopped while draining: {}", session_id, reason);
                    return;
                }
                error!("[{}] Transcoder failed: {}", session_id, reason);
                let message = SessionError::Runtime(reason).client_message();
                self.notify_viewers(session_id, |id| SessionNotification::Error {
                    session_id: Some(id),
                    message: message.clone(),
                });
                if let Some(process) = self.registry.get(session_id).and_then(|s| s.process.as_ref()) {
                    process.terminate(TerminateMode::Forced);
                }
                self.finish(session_id);
            }
            TranscoderEvent::Exited { code } => {
                info!("[{}] Transcoder exited with code {:?}", session_id, code);
                if state != SessionState::Draining {
                    self.notify_viewers(session_id, |id| SessionNotification::Ended {
                        session_id: id,
                    });
                }
                self.finish(session_id);
            }
        }
    }

    fn begin_drain(&mut self, session_id: &SessionId) {
        let grace_period = self.settings.grace_period;
        let events_tx = self.events_tx.clone();
        let Some(session) = self.registry.get_mut(session_id) else {
            return;
        };
        if session.state == SessionState::Draining {
            return;
        }

        info!(
            "[{}] No viewers left, draining (grace {}s)",
            session_id,
            grace_period.as_secs()
        );
        session.state = SessionState::Draining;
        if let Some(process) = &session.process {
            process.terminate(TerminateMode::Graceful);
        }
        let timer_id = session_id.clone();
        session.drain_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(grace_period).await;
            let _ = events_tx.send(ControlEvent::DrainExpired {
                session_id: timer_id,
            });
        }));
    }

    fn on_drain_expired(&mut self, session_id: &SessionId) {
        let Some(session) = self.registry.get(session_id) else {
            return;
        };
        if session.state != SessionState::Draining {
            return;
        }
        warn!("[{}] Grace period expired, forcing termination", session_id);
        if let Some(process) = &session.process {
            process.terminate(TerminateMode::Forced);
        }
        self.finish(session_id);
    }

    /// Removes the session and purges its artifacts. Purge failures are only logged.
    fn finish(&mut self, session_id: &SessionId) {
        let Some(mut session) = self.registry.remove(session_id) else {
            return;
        };
        session.cancel_drain_timer();
        session.state = SessionState::Terminated;
        info!("[{}] Session {}", session_id, session.state);
        self.spawn_purge(session_id.clone());
    }

    fn spawn_purge(&mut self, session_id: SessionId) {
        self.purges.retain(|purge| !purge.is_finished());
        let storage = self.storage.clone();
        self.purges.push(tokio::spawn(async move {
            let id = session_id.clone();
            match tokio::task::spawn_blocking(move || storage.purge(&id)).await {
                Ok(Ok(count)) => debug!("[{}] Removed {} artifact(s)", session_id, count),
                Ok(Err(e)) => warn!("[{}] Artifact cleanup failed: {}", session_id, e),
                Err(e) => error!("[{}] Artifact cleanup task failed: {}", session_id, e),
            }
        }));
    }

    fn notify_viewers<F>(&self, session_id: &SessionId, make: F)
    where
        F: Fn(SessionId) -> SessionNotification,
    {
        if let Some(session) = self.registry.get(session_id) {
            for connection_id in &session.viewers {
                self.notifier.notify(*connection_id, make(session_id.clone()));
            }
        }
    }

    async fn shutdown(&mut self) {
        let sessions = self.registry.drain_all();
        info!("Shutting down {} session(s)", sessions.len());
        for mut session in sessions {
            session.cancel_drain_timer();
            if let Some(process) = &session.process {
                process.terminate(TerminateMode::Forced);
            }
            self.spawn_purge(session.id.clone());
        }
        for purge in self.purges.drain(..) {
            if let Err(e) = purge.await {
                error!("Artifact cleanup task failed: {}", e);
            }
        }
    }
}

/// Forwards the events of one process into the control channel.
fn event_sink(events_tx: mpsc::UnboundedSender<ControlEvent>, session_id: SessionId) -> EventSink {
    Arc::new(move |event| {
        let _ = events_tx.send(ControlEvent::Process {
            session_id: session_id.clone(),
            event,
        });
    })
}

/// Cloneable client side of the [`SessionManager`].
#[derive(Clone)]
pub struct SessionManagerHandle {
    tx: mpsc::UnboundedSender<ControlEvent>,
}

impl SessionManagerHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ControlEvent,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| SessionError::ManagerUnavailable)?;
        response.await.map_err(|_| SessionError::ManagerUnavailable)
    }

    /// Validates `source` and creates a session viewed by `connection_id`.
    ///
    /// `Ok` means the transcoder is being started; the outcome is notified later.
    pub async fn request_start(
        &self,
        connection_id: ConnectionId,
        source: &str,
    ) -> Result<SessionId, SessionError> {
        let source = source.to_string();
        self.request(|reply| ControlEvent::StartStream {
            connection_id,
            source,
            reply,
        })
        .await?
    }

    /// Detaches `connection_id` from the session. Ids that are malformed, unknown, or not
    /// viewed by the connection all yield `NotFound`.
    pub async fn request_stop(
        &self,
        connection_id: ConnectionId,
        raw_session_id: &str,
    ) -> Result<(), SessionError> {
        let session_id = SessionId::parse(raw_session_id)
            .ok_or_else(|| SessionError::NotFound(raw_session_id.to_string()))?;
        self.request(|reply| ControlEvent::StopStream {
            connection_id,
            session_id,
            reply,
        })
        .await?
    }

    /// Detaches the connection from everything it joined. Resolves once applied.
    pub async fn connection_closed(&self, connection_id: ConnectionId) {
        let result = self
            .request(|reply| ControlEvent::ConnectionClosed {
                connection_id,
                reply,
            })
            .await;
        if result.is_err() {
            debug!("[conn {}] Close not delivered, manager stopped", connection_id);
        }
    }

    pub async fn is_live(&self, session_id: &SessionId) -> bool {
        let session_id = session_id.clone();
        self.request(|reply| ControlEvent::IsLive { session_id, reply })
            .await
            .unwrap_or(false)
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, SessionError> {
        self.request(|reply| ControlEvent::ListSessions { reply }).await
    }

    /// Kills every process, purges all artifacts and stops the manager.
    pub async fn shutdown(&self) {
        if self
            .request(|reply| ControlEvent::Shutdown { reply })
            .await
            .is_err()
        {
            debug!("Session manager already stopped");
        }
    }
}
