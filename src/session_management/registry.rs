use chrono::Utc;
use std::collections::HashMap;

use crate::session_management::session::{Session, SessionId, SessionSummary};
use crate::session_management::types::ConnectionId;
use crate::session_management::validation::mask_credentials;

/// Live sessions keyed by id.
///
/// Only the lifecycle controller holds one, so no locking is involved. A session is removed
/// in the same step that marks it terminated.
#[derive(Default)]
pub struct StreamRegistry {
    sessions: HashMap<SessionId, Session>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, session: Session) {
        self.sessions.insert(session.id.clone(), session);
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    pub fn remove(&mut self, id: &SessionId) -> Option<Session> {
        self.sessions.remove(id)
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of sessions counted against the stream ceiling, draining ones included.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Removes `connection_id` from the viewers of `id` and returns the remaining count, or
    /// `None` if it was not a viewer of a known session.
    pub fn detach_viewer(&mut self, id: &SessionId, connection_id: ConnectionId) -> Option<usize> {
        let session = self.sessions.get_mut(id)?;
        if session.viewers.remove(&connection_id) {
            Some(session.viewers.len())
        } else {
            None
        }
    }

    pub fn sessions_viewed_by(&self, connection_id: ConnectionId) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|s| s.viewers.contains(&connection_id))
            .map(|s| s.id.clone())
            .collect()
    }

    /// Listing sorted by creation time, oldest first.
    pub fn summaries(&self, mask: bool) -> Vec<SessionSummary> {
        let now = Utc::now();
        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .values()
            .map(|s| SessionSummary {
                id: s.id.clone(),
                source_address: if mask {
                    mask_credentials(&s.source)
                } else {
                    s.source.clone()
                },
                viewer_count: s.viewers.len(),
                started_at: s.created_at,
                age_ms: (now - s.created_at).num_milliseconds(),
                status: s.state,
            })
            .collect();
        summaries.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        summaries
    }

    pub fn drain_all(&mut self) -> Vec<Session> {
        self.sessions.drain().map(|(_, s)| s).collect()
    }
}
