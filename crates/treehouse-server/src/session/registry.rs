//! Session Registry
//!
//! One entry per live session in a sharded map. Entry guards are never held
//! across an await: every method copies what it needs and returns.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::SessionError;
use crate::protocol::ServerEvent;
use crate::types::{ConnectionId, SessionInfo, SessionState};

/// Where a session's events go. Unbounded so emitting never blocks a reader.
pub type EventSink = mpsc::UnboundedSender<ServerEvent>;

/// Finished sessions remembered so `stop` stays idempotent after exit.
const FINISHED_HISTORY: usize = 256;

pub struct SessionEntry {
    pub id: String,
    pub connection_id: Option<ConnectionId>,
    pub command: String,
    pub working_directory: PathBuf,
    pub state: SessionState,
    pub pid: Option<u32>,
    pub created_at: String,
    sink: Option<EventSink>,
    terminate: CancellationToken,
}

impl SessionEntry {
    pub fn new(
        id: String,
        connection_id: ConnectionId,
        command: String,
        working_directory: PathBuf,
        sink: EventSink,
        terminate: CancellationToken,
    ) -> Self {
        Self {
            id,
            connection_id: Some(connection_id),
            command,
            working_directory,
            state: SessionState::Starting,
            pid: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            sink: Some(sink),
            terminate,
        }
    }

    pub fn to_info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            connection_id: self.connection_id.clone(),
            command: self.command.clone(),
            working_directory: self.working_directory.clone(),
            state: self.state.clone(),
            pid: self.pid,
            created_at: self.created_at.clone(),
        }
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    live: DashMap<String, SessionEntry>,
    finished: Mutex<VecDeque<(String, SessionState)>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: SessionEntry) {
        self.live.insert(entry.id.clone(), entry);
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<SessionInfo> {
        self.live.get(id).map(|e| e.to_info())
    }

    /// Live sessions ordered by creation time.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self.live.iter().map(|e| e.to_info()).collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        sessions
    }

    pub fn count_for_connection(&self, connection_id: &str) -> usize {
        self.live
            .iter()
            .filter(|e| e.connection_id.as_deref() == Some(connection_id))
            .count()
    }

    pub fn set_running(&self, id: &str, pid: Option<u32>) {
        if let Some(mut entry) = self.live.get_mut(id) {
            entry.state = SessionState::Running;
            entry.pid = pid;
        }
    }

    pub fn set_state(&self, id: &str, state: SessionState) {
        if let Some(mut entry) = self.live.get_mut(id) {
            entry.state = state;
        }
    }

    /// Send an event to the session's bound connection.
    ///
    /// Dropped when nothing is bound; a sink whose receiver is gone is
    /// unbound on first failure.
    pub fn emit(&self, id: &str, event: ServerEvent) {
        let Some(sink) = self.live.get(id).and_then(|e| e.sink.clone()) else {
            return;
        };
        if sink.send(event).is_err() {
            debug!(event = "server.session.sink_closed", session_id = id);
            if let Some(mut entry) = self.live.get_mut(id)
                && entry.sink.as_ref().is_some_and(|s| s.same_channel(&sink))
            {
                entry.sink = None;
                entry.connection_id = None;
            }
        }
    }

    /// Re-bind a live session's output to another connection.
    pub fn bind(
        &self,
        id: &str,
        connection_id: ConnectionId,
        sink: EventSink,
    ) -> Result<SessionInfo, SessionError> {
        let mut entry = self
            .live
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound { id: id.to_string() })?;
        entry.connection_id = Some(connection_id);
        entry.sink = Some(sink);
        Ok(entry.to_info())
    }

    /// Unbind every session owned by a closed connection. Sessions keep running.
    pub fn detach_connection(&self, connection_id: &str) -> usize {
        let mut detached = 0;
        for mut entry in self.live.iter_mut() {
            if entry.connection_id.as_deref() == Some(connection_id) {
                entry.connection_id = None;
                entry.sink = None;
                detached += 1;
            }
        }
        detached
    }

    pub fn terminate_token(&self, id: &str) -> Option<CancellationToken> {
        self.live.get(id).map(|e| e.terminate.clone())
    }

    /// Remove a session that reached a terminal state and remember it.
    pub fn finish(&self, id: &str, state: SessionState) -> Option<SessionEntry> {
        let removed = self.live.remove(id).map(|(_, entry)| entry);
        let mut finished = self.finished.lock().unwrap_or_else(|e| e.into_inner());
        if finished.len() >= FINISHED_HISTORY {
            finished.pop_front();
        }
        finished.push_back((id.to_string(), state));
        removed
    }

    /// Final state of a recently finished session.
    pub fn finished_state(&self, id: &str) -> Option<SessionState> {
        self.finished
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|(finished_id, _)| finished_id == id)
            .map(|(_, state)| state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, connection: &str, sink: EventSink) -> SessionEntry {
        SessionEntry::new(
            id.to_string(),
            connection.to_string(),
            "echo hi".to_string(),
            PathBuf::from("/tmp"),
            sink,
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_emit_routes_to_bound_sink() {
        let registry = SessionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.insert(entry("s1", "c1", tx));

        registry.emit("s1", ServerEvent::Pong);
        assert_eq!(rx.try_recv().unwrap(), ServerEvent::Pong);

        // Unknown ids are ignored
        registry.emit("nope", ServerEvent::Pong);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_bind_moves_output_to_new_connection() {
        let registry = SessionRegistry::new();
        let (old_tx, mut old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();
        registry.insert(entry("s1", "c1", old_tx));

        let info = registry.bind("s1", "c2".to_string(), new_tx).unwrap();
        assert_eq!(info.connection_id.as_deref(), Some("c2"));

        registry.emit("s1", ServerEvent::Pong);
        assert!(old_rx.try_recv().is_err());
        assert_eq!(new_rx.try_recv().unwrap(), ServerEvent::Pong);

        assert!(matches!(
            registry.bind("missing", "c2".to_string(), mpsc::unbounded_channel().0),
            Err(SessionError::NotFound { .. })
        ));
    }

    #[test]
    fn test_detach_connection_keeps_sessions() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.insert(entry("s1", "c1", tx.clone()));
        registry.insert(entry("s2", "c1", tx.clone()));
        registry.insert(entry("s3", "c2", tx));

        assert_eq!(registry.detach_connection("c1"), 2);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.count_for_connection("c1"), 0);
        assert_eq!(registry.count_for_connection("c2"), 1);
    }

    #[test]
    fn test_emit_to_closed_receiver_unbinds() {
        let registry = SessionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.insert(entry("s1", "c1", tx));
        drop(rx);

        registry.emit("s1", ServerEvent::Pong);
        assert_eq!(registry.get("s1").unwrap().connection_id, None);
    }

    #[test]
    fn test_finish_records_history() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.insert(entry("s1", "c1", tx));
        registry.set_running("s1", Some(42));
        assert_eq!(registry.get("s1").unwrap().pid, Some(42));

        let removed = registry.finish("s1", SessionState::Exited { code: Some(0) });
        assert!(removed.is_some());
        assert!(registry.is_empty());
        assert_eq!(
            registry.finished_state("s1"),
            Some(SessionState::Exited { code: Some(0) })
        );
        assert_eq!(registry.finished_state("s2"), None);
    }
}
