//! Connection id to terminal session mapping

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::models::SessionSummary;

use super::Session;

/// Active terminal sessions keyed by connection id
///
/// Backed by a sharded map: different keys never contend, operations on the
/// same key are serialized by the shard lock.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session, closing whatever was registered for the same connection
    pub fn put(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        let key = session.connection_id.clone();
        let previous = self.sessions.insert(key, session);

        if let Some(stale) = &previous {
            if stale.close() {
                debug!(
                    connection_id = %stale.connection_id,
                    exec_id = %stale.exec_id,
                    "Replaced terminal session closed"
                );
            }
        }

        crate::metrics::record_terminal_sessions(self.sessions.len());
        previous
    }

    /// Look up a session without taking ownership
    pub fn get(&self, connection_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .get(connection_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Remove and return a session
    pub fn remove(&self, connection_id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(connection_id).map(|(_, session)| session);
        crate::metrics::record_terminal_sessions(self.sessions.len());
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Summaries of every active session, oldest first
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .iter()
            .map(|entry| entry.value().summary())
            .collect();
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }
}
