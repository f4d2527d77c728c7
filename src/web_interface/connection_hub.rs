use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error_handling::types::ConnectionError;
use crate::session_management::{ConnectionId, Notifier, SessionId, SessionNotification};
use crate::web_interface::protocol::ServerMessage;

/// WebSocket close code for policy violations.
pub const POLICY_VIOLATION: u16 = 1008;

/// What a connection task should write next.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Frame(ServerMessage),
    Close { code: u16, reason: String },
}

struct ConnectionEntry {
    tx: mpsc::UnboundedSender<Outbound>,
    last_activity: Instant,
    joined: HashSet<SessionId>,
}

/// Table of open control connections.
///
/// The hub never touches sockets: each connection task drains its own outbound channel, so
/// sending from here never blocks.
pub struct ConnectionHub {
    connections: Mutex<HashMap<ConnectionId, ConnectionEntry>>,
    next_id: AtomicU64,
    max_connections: usize,
}

/// Result of one liveness pass.
#[derive(Debug, Default, PartialEq)]
pub struct LivenessReport {
    pub probed: usize,
    pub closed: usize,
}

impl ConnectionHub {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            max_connections,
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<ConnectionId, ConnectionEntry>> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Admits a connection unless the ceiling is reached.
    pub fn register(
        &self,
    ) -> Result<(ConnectionId, mpsc::UnboundedReceiver<Outbound>), ConnectionError> {
        let mut table = self.table();
        if table.len() >= self.max_connections {
            warn!(
                "Rejecting connection: limit of {} reached",
                self.max_connections
            );
            return Err(ConnectionError::LimitReached(self.max_connections));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        table.insert(
            id,
            ConnectionEntry {
                tx,
                last_activity: Instant::now(),
                joined: HashSet::new(),
            },
        );
        info!(
            "[conn {}] Connected ({}/{})",
            id,
            table.len(),
            self.max_connections
        );
        Ok((id, rx))
    }

    pub fn unregister(&self, id: ConnectionId) {
        if let Some(entry) = self.table().remove(&id) {
            info!(
                "[conn {}] Disconnected ({} joined session(s))",
                id,
                entry.joined.len()
            );
        }
    }

    /// Records inbound traffic.
    pub fn touch(&self, id: ConnectionId) {
        if let Some(entry) = self.table().get_mut(&id) {
            entry.last_activity = Instant::now();
        }
    }

    pub fn send(&self, id: ConnectionId, message: ServerMessage) -> Result<(), ConnectionError> {
        let table = self.table();
        let entry = table
            .get(&id)
            .ok_or(ConnectionError::UnknownConnection(id))?;
        entry
            .tx
            .send(Outbound::Frame(message))
            .map_err(|_| ConnectionError::UnknownConnection(id))
    }

    pub fn joined_sessions(&self, id: ConnectionId) -> Vec<SessionId> {
        self.table()
            .get(&id)
            .map(|entry| entry.joined.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.table().len()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Closes connections idle for longer than `timeout` and probes the others.
    ///
    /// Idle connections are only asked to close; their task unregisters them on the way out.
    /// Entries whose task is already gone are dropped here.
    pub fn sweep_liveness(&self, timeout: Duration) -> LivenessReport {
        let now = Instant::now();
        let mut report = LivenessReport::default();
        self.table().retain(|id, entry| {
            let idle = now.duration_since(entry.last_activity);
            let outbound = if idle > timeout {
                debug!("[conn {}] Idle for {}s, closing", id, idle.as_secs());
                report.closed += 1;
                Outbound::Close {
                    code: POLICY_VIOLATION,
                    reason: "Liveness timeout".to_string(),
                }
            } else {
                report.probed += 1;
                Outbound::Frame(ServerMessage::Ping)
            };
            entry.tx.send(outbound).is_ok()
        });
        report
    }

    /// Runs [`sweep_liveness`](Self::sweep_liveness) every `interval`, closing connections
    /// silent for twice that long.
    pub fn spawn_liveness(self: &Arc<Self>, interval: Duration) -> LivenessHandle {
        let hub = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = hub.sweep_liveness(interval * 2);
                        debug!("Liveness pass: {} probed, {} closed", report.probed, report.closed);
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
        LivenessHandle { shutdown_tx, task }
    }
}

impl Notifier for ConnectionHub {
    fn notify(&self, connection_id: ConnectionId, notification: SessionNotification) {
        if let Some(entry) = self.table().get_mut(&connection_id) {
            match &notification {
                SessionNotification::Started { session_id } => {
                    entry.joined.insert(session_id.clone());
                }
                SessionNotification::Ended { session_id }
                | SessionNotification::Stopped { session_id }
                | SessionNotification::Error {
                    session_id: Some(session_id),
                    ..
                } => {
                    entry.joined.remove(session_id);
                }
                SessionNotification::Error { session_id: None, .. } => {}
            }
        }
        if self.send(connection_id, notification.into()).is_err() {
            debug!("[conn {}] Notification dropped, connection gone", connection_id);
        }
    }
}

pub struct LivenessHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LivenessHandle {
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("Liveness task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(outbound: Outbound) -> ServerMessage {
        match outbound {
            Outbound::Frame(message) => message,
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[test]
    fn enforces_the_connection_ceiling() {
        let hub = ConnectionHub::new(2);
        let (a, _rx_a) = hub.register().unwrap();
        let (_b, _rx_b) = hub.register().unwrap();

        assert!(matches!(
            hub.register(),
            Err(ConnectionError::LimitReached(2))
        ));
        assert_eq!(hub.connection_count(), 2);

        hub.unregister(a);
        assert!(hub.register().is_ok());
        assert_eq!(hub.connection_count(), 2);
    }

    #[test]
    fn ids_are_not_reused() {
        let hub = ConnectionHub::new(1);
        let (a, _rx) = hub.register().unwrap();
        hub.unregister(a);
        let (b, _rx) = hub.register().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn notifications_reach_the_connection_and_update_joined_sessions() {
        let hub = ConnectionHub::new(4);
        let (id, mut rx) = hub.register().unwrap();
        let session_id = SessionId::generate();

        hub.notify(
            id,
            SessionNotification::Started {
                session_id: session_id.clone(),
            },
        );
        assert_eq!(hub.joined_sessions(id), vec![session_id.clone()]);

        hub.notify(
            id,
            SessionNotification::Ended {
                session_id: session_id.clone(),
            },
        );
        assert!(hub.joined_sessions(id).is_empty());

        assert!(matches!(
            frame(rx.try_recv().unwrap()),
            ServerMessage::StreamStarted { .. }
        ));
        assert_eq!(
            frame(rx.try_recv().unwrap()),
            ServerMessage::StreamEnded {
                stream_id: session_id
            }
        );
    }

    #[test]
    fn notify_for_unknown_connection_is_ignored() {
        let hub = ConnectionHub::new(4);
        hub.notify(
            42,
            SessionNotification::Stopped {
                session_id: SessionId::generate(),
            },
        );
        assert!(matches!(
            hub.send(42, ServerMessage::Ping),
            Err(ConnectionError::UnknownConnection(42))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn liveness_probes_active_and_closes_idle_connections() {
        let hub = ConnectionHub::new(4);
        let (quiet, mut quiet_rx) = hub.register().unwrap();
        let (chatty, mut chatty_rx) = hub.register().unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        hub.touch(chatty);
        tokio::time::advance(Duration::from_secs(20)).await;

        let report = hub.sweep_liveness(Duration::from_secs(60));
        assert_eq!(report, LivenessReport { probed: 1, closed: 1 });
        assert_eq!(frame(chatty_rx.try_recv().unwrap()), ServerMessage::Ping);
        assert!(matches!(
            quiet_rx.try_recv().unwrap(),
            Outbound::Close { code: POLICY_VIOLATION, .. }
        ));
        // The connection task is responsible for unregistering.
        assert_eq!(hub.connection_count(), 2);
        hub.unregister(quiet);
        assert_eq!(hub.connection_count(), 1);
    }

    #[test]
    fn sweep_drops_entries_whose_task_is_gone() {
        let hub = ConnectionHub::new(4);
        let (_id, rx) = hub.register().unwrap();
        drop(rx);

        hub.sweep_liveness(Duration::from_secs(60));
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn liveness_loop_pings_on_interval() {
        let hub = Arc::new(ConnectionHub::new(4));
        let (_id, mut rx) = hub.register().unwrap();
        let liveness = hub.spawn_liveness(Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(frame(rx.try_recv().unwrap()), ServerMessage::Ping);

        liveness.stop().await;
    }
}
