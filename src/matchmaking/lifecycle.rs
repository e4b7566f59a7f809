//! Session teardown: disconnect, stale sweep and drain

use std::sync::Arc;

use chrono::Utc;

use crate::websocket::ServerMessage;

use super::handle::ConnectionHandle;
use super::state::{MatchState, Outbox};
use super::types::{ConnectionId, SessionState};

/// What a removed session looked like at the moment it was removed
#[derive(Clone)]
pub struct RemovedSession {
    pub handle: Arc<ConnectionHandle>,
    pub state: SessionState,
    /// Peer that was returned to idle and told about the departure
    pub notified_peer: Option<ConnectionId>,
}

impl MatchState {
    /// Remove a session and restore the invariants around it.
    ///
    /// This is the only path that deletes a session: a waiting session leaves
    /// the queue, a matched peer goes back to `Idle` and gets one `peer-left`.
    pub fn remove(&mut self, id: ConnectionId, outbox: &mut Outbox) -> Option<RemovedSession> {
        let session = self.registry.remove(id)?;

        let mut notified_peer = None;
        match session.state {
            SessionState::Idle => {}
            SessionState::Waiting => {
                self.queue.remove(id);
            }
            SessionState::Matched { peer } => {
                if let Ok(peer_session) = self.registry.lookup_mut(peer) {
                    if peer_session.state == (SessionState::Matched { peer: id }) {
                        peer_session.state = SessionState::Idle;
                        outbox.push(&peer_session.handle, ServerMessage::PeerLeft);
                        notified_peer = Some(peer);
                    }
                }
            }
        }

        tracing::debug!(
            connection_id = %id,
            state = session.state.name(),
            notified_peer = ?notified_peer,
            "Session removed"
        );

        Some(RemovedSession {
            handle: session.handle,
            state: session.state,
            notified_peer,
        })
    }

    /// Connections with no activity for longer than `timeout_secs`
    pub fn find_stale(&self, timeout_secs: u64) -> Vec<ConnectionId> {
        let now = Utc::now();
        let timeout = chrono::Duration::seconds(timeout_secs as i64);

        self.registry
            .iter()
            .filter(|s| now.signed_duration_since(s.handle.last_activity()) > timeout)
            .map(|s| s.id())
            .collect()
    }

    /// Remove every session and stop accepting registrations.
    /// No `peer-left` is produced; callers notify the returned handles.
    pub fn drain(&mut self) -> Vec<Arc<ConnectionHandle>> {
        self.accepting = false;
        self.queue.clear();
        self.registry
            .drain()
            .into_iter()
            .map(|session| session.handle)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchmaking::error::SignalingError;
    use crate::matchmaking::state::tests::{assert_symmetric, connect, messages_for, user};
    use crate::matchmaking::state::MatchOutcome;

    #[test]
    fn test_remove_waiting_purges_queue() {
        let mut state = MatchState::new();
        let a = connect(&mut state);
        let b = connect(&mut state);
        let mut outbox = Outbox::new();
        state.request_match(a.id(), user("a"), &mut outbox).unwrap();

        let mut outbox = Outbox::new();
        let removed = state.remove(a.id(), &mut outbox).unwrap();
        assert_eq!(removed.state, SessionState::Waiting);
        assert!(outbox.is_empty());
        assert!(state.queued().is_empty());

        // Later arrival must not pair with the departed session
        let outcome = state.request_match(b.id(), user("b"), &mut outbox).unwrap();
        assert_eq!(outcome, MatchOutcome::Waiting);
    }

    #[test]
    fn test_remove_matched_frees_peer_once() {
        let mut state = MatchState::new();
        let a = connect(&mut state);
        let b = connect(&mut state);
        let mut outbox = Outbox::new();
        state.request_match(a.id(), user("a"), &mut outbox).unwrap();
        state.request_match(b.id(), user("b"), &mut outbox).unwrap();

        let mut outbox = Outbox::new();
        let removed = state.remove(a.id(), &mut outbox).unwrap();

        assert_eq!(removed.notified_peer, Some(b.id()));
        assert_eq!(state.lookup(b.id()).unwrap().state, SessionState::Idle);
        assert_eq!(messages_for(&outbox, b.id()), vec![ServerMessage::PeerLeft]);
        assert_eq!(outbox.len(), 1);
        assert_symmetric(&state);

        // Freed peer is not requeued automatically
        assert!(state.queued().is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut state = MatchState::new();
        let a = connect(&mut state);
        let mut outbox = Outbox::new();

        assert!(state.remove(a.id(), &mut outbox).is_some());
        assert!(state.remove(a.id(), &mut outbox).is_none());
        assert_eq!(state.lookup(a.id()).err(), Some(SignalingError::NotFound(a.id())));
    }

    #[test]
    fn test_freed_peer_can_match_again() {
        let mut state = MatchState::new();
        let a = connect(&mut state);
        let b = connect(&mut state);
        let c = connect(&mut state);
        let mut outbox = Outbox::new();
        state.request_match(a.id(), user("a"), &mut outbox).unwrap();
        state.request_match(b.id(), user("b"), &mut outbox).unwrap();
        state.remove(a.id(), &mut outbox);

        state.request_match(c.id(), user("c"), &mut outbox).unwrap();
        let outcome = state.request_match(b.id(), user("b"), &mut outbox).unwrap();

        assert!(matches!(outcome, MatchOutcome::Matched { peer, .. } if peer == c.id()));
        assert_symmetric(&state);
    }

    #[test]
    fn test_find_stale() {
        let mut state = MatchState::new();
        let fresh = connect(&mut state);
        let stale = connect(&mut state);
        stale
            .handle
            .set_last_activity(Utc::now() - chrono::Duration::seconds(300));

        assert_eq!(state.find_stale(120), vec![stale.id()]);
        assert!(!state.find_stale(120).contains(&fresh.id()));
    }

    #[test]
    fn test_drain_empties_and_rejects() {
        let mut state = MatchState::new();
        let a = connect(&mut state);
        let b = connect(&mut state);
        let c = connect(&mut state);
        let mut outbox = Outbox::new();
        state.request_match(a.id(), user("a"), &mut outbox).unwrap();
        state.request_match(b.id(), user("b"), &mut outbox).unwrap();
        state.request_match(c.id(), user("c"), &mut outbox).unwrap();

        let drained = state.drain();

        assert_eq!(drained.len(), 3);
        assert_eq!(state.stats().total, 0);
        assert!(state.queued().is_empty());
        assert!(!state.is_accepting());

        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let late = Arc::new(ConnectionHandle::new(None, tx));
        assert_eq!(state.register(late).err(), Some(SignalingError::ShuttingDown));
    }
}
