//! Registry and queue under one owner, plus the pairing algorithm.
//!
//! `MatchState` never performs I/O. Each operation records the messages it
//! wants delivered in an [`Outbox`], which the hub flushes after the lock is
//! released.

use std::sync::Arc;
use std::time::Instant;

use crate::websocket::ServerMessage;

use super::error::SignalingError;
use super::handle::ConnectionHandle;
use super::queue::WaitQueue;
use super::registry::ConnectionRegistry;
use super::types::{ConnectionId, HubStats, SessionInfo, SessionState, UserInfo};

pub struct Delivery {
    pub to: Arc<ConnectionHandle>,
    pub message: ServerMessage,
}

/// Messages produced under the lock, queued to each recipient before it is released
#[derive(Default)]
pub struct Outbox {
    deliveries: Vec<Delivery>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, to: &Arc<ConnectionHandle>, message: ServerMessage) {
        self.deliveries.push(Delivery {
            to: to.clone(),
            message,
        });
    }

    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Delivery> {
        self.deliveries.iter()
    }
}

impl IntoIterator for Outbox {
    type Item = Delivery;
    type IntoIter = std::vec::IntoIter<Delivery>;

    fn into_iter(self) -> Self::IntoIter {
        self.deliveries.into_iter()
    }
}

/// Result of a matchmaking request, from the requester's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Queue was empty; requester is now waiting
    Waiting,
    /// Requester was paired with the oldest waiting session
    Matched {
        peer: ConnectionId,
        initiator: bool,
        waited: Option<std::time::Duration>,
    },
    /// Requester was already queued; nothing changed
    AlreadyWaiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    NotWaiting,
}

pub struct MatchState {
    pub(super) registry: ConnectionRegistry,
    pub(super) queue: WaitQueue,
    pub(super) accepting: bool,
}

impl Default for MatchState {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchState {
    pub fn new() -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            queue: WaitQueue::new(),
            accepting: true,
        }
    }

    pub fn register(&mut self, handle: Arc<ConnectionHandle>) -> Result<SessionInfo, SignalingError> {
        if !self.accepting {
            return Err(SignalingError::ShuttingDown);
        }
        self.registry.register(handle).map(|session| session.info())
    }

    pub fn lookup(&self, id: ConnectionId) -> Result<SessionInfo, SignalingError> {
        self.registry.lookup(id).map(|session| session.info())
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Pair the requester with the head of the queue, or enqueue it.
    pub fn request_match(
        &mut self,
        id: ConnectionId,
        user: UserInfo,
        outbox: &mut Outbox,
    ) -> Result<MatchOutcome, SignalingError> {
        let session = self.registry.lookup_mut(id)?;
        match session.state {
            SessionState::Waiting => {
                outbox.push(&session.handle, ServerMessage::Waiting);
                return Ok(MatchOutcome::AlreadyWaiting);
            }
            SessionState::Matched { .. } => {
                return Err(SignalingError::InvalidState {
                    operation: "join matchmaking",
                    state: "matched",
                });
            }
            SessionState::Idle => {}
        }
        session.user = Some(user);

        while let Some(peer_id) = self.queue.pop_front() {
            // An idle requester is never queued, so the head is always another session
            if peer_id == id {
                continue;
            }
            let peer_waiting = matches!(
                self.registry.lookup(peer_id),
                Ok(peer) if peer.state == SessionState::Waiting
            );
            if peer_waiting {
                return self.pair(id, peer_id, outbox);
            }
            tracing::warn!(connection_id = %peer_id, "Dropping stale wait queue entry");
        }

        let session = self.registry.lookup_mut(id)?;
        session.state = SessionState::Waiting;
        session.waiting_since = Some(Instant::now());
        self.queue.push(id);
        outbox.push(&session.handle, ServerMessage::Waiting);
        Ok(MatchOutcome::Waiting)
    }

    /// Transition both sessions to `Matched` and notify each side.
    fn pair(
        &mut self,
        requester_id: ConnectionId,
        waiting_id: ConnectionId,
        outbox: &mut Outbox,
    ) -> Result<MatchOutcome, SignalingError> {
        let requester = self.registry.lookup(requester_id)?;
        let requester_seq = requester.registration_seq;
        let requester_name = requester.display_name().to_string();
        let requester_handle = requester.handle.clone();

        let waiting = self.registry.lookup(waiting_id)?;
        let waiting_seq = waiting.registration_seq;
        let waiting_name = waiting.display_name().to_string();
        let waiting_handle = waiting.handle.clone();
        let waited = waiting.waiting_since.map(|since| since.elapsed());

        let requester = self.registry.lookup_mut(requester_id)?;
        requester.state = SessionState::Matched { peer: waiting_id };
        requester.waiting_since = None;
        let waiting = self.registry.lookup_mut(waiting_id)?;
        waiting.state = SessionState::Matched { peer: requester_id };
        waiting.waiting_since = None;

        // Earlier registration creates the offer
        let requester_initiates = requester_seq < waiting_seq;
        let initiator_id = if requester_initiates { requester_id } else { waiting_id };

        outbox.push(
            &requester_handle,
            ServerMessage::match_found(waiting_id, waiting_name, requester_initiates),
        );
        outbox.push(
            &waiting_handle,
            ServerMessage::match_found(requester_id, requester_name, !requester_initiates),
        );

        tracing::info!(
            connection_id = %requester_id,
            peer_id = %waiting_id,
            initiator = %initiator_id,
            "Sessions matched"
        );

        Ok(MatchOutcome::Matched {
            peer: waiting_id,
            initiator: requester_initiates,
            waited,
        })
    }

    /// Leave the queue. Always acknowledged with `match-cancelled`.
    pub fn cancel_match(
        &mut self,
        id: ConnectionId,
        outbox: &mut Outbox,
    ) -> Result<CancelOutcome, SignalingError> {
        let session = self.registry.lookup_mut(id)?;
        let outcome = if session.state == SessionState::Waiting {
            session.state = SessionState::Idle;
            session.waiting_since = None;
            self.queue.remove(id);
            CancelOutcome::Cancelled
        } else {
            CancelOutcome::NotWaiting
        };
        outbox.push(&session.handle, ServerMessage::MatchCancelled);
        Ok(outcome)
    }

    pub fn stats(&self) -> HubStats {
        let mut stats = HubStats {
            total: self.registry.len(),
            queue_length: self.queue.len(),
            ..Default::default()
        };
        let mut matched = 0;
        for session in self.registry.iter() {
            match session.state {
                SessionState::Idle => stats.idle += 1,
                SessionState::Waiting => stats.waiting += 1,
                SessionState::Matched { .. } => matched += 1,
            }
        }
        stats.matched_pairs = matched / 2;
        stats
    }

    pub fn connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.registry.iter().map(|s| s.handle.clone()).collect()
    }

    /// Ids of waiting sessions, oldest first
    pub fn queued(&self) -> Vec<ConnectionId> {
        self.queue.iter().copied().collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::sync::mpsc;

    pub(crate) struct TestConn {
        pub handle: Arc<ConnectionHandle>,
        pub rx: mpsc::Receiver<ServerMessage>,
    }

    impl TestConn {
        pub fn id(&self) -> ConnectionId {
            self.handle.id
        }
    }

    pub(crate) fn connect(state: &mut MatchState) -> TestConn {
        let (tx, rx) = mpsc::channel(16);
        let handle = Arc::new(ConnectionHandle::new(None, tx));
        state.register(handle.clone()).unwrap();
        TestConn { handle, rx }
    }

    pub(crate) fn user(name: &str) -> UserInfo {
        UserInfo::new(format!("id-{}", name), name)
    }

    /// Messages addressed to `id` in the outbox
    pub(crate) fn messages_for(outbox: &Outbox, id: ConnectionId) -> Vec<ServerMessage> {
        outbox
            .iter()
            .filter(|d| d.to.id == id)
            .map(|d| d.message.clone())
            .collect()
    }

    pub(crate) fn assert_symmetric(state: &MatchState) {
        for session in state.registry.iter() {
            if let SessionState::Matched { peer } = session.state {
                let other = state.registry.lookup(peer).expect("matched peer must be registered");
                assert_eq!(other.state, SessionState::Matched { peer: session.id() });
            }
        }
    }

    #[test]
    fn test_first_request_waits() {
        let mut state = MatchState::new();
        let a = connect(&mut state);
        let mut outbox = Outbox::new();

        let outcome = state.request_match(a.id(), user("a"), &mut outbox).unwrap();

        assert_eq!(outcome, MatchOutcome::Waiting);
        assert_eq!(state.lookup(a.id()).unwrap().state, SessionState::Waiting);
        assert_eq!(messages_for(&outbox, a.id()), vec![ServerMessage::Waiting]);
        assert_eq!(state.queued(), vec![a.id()]);
    }

    #[test]
    fn test_second_request_pairs_with_head() {
        let mut state = MatchState::new();
        let a = connect(&mut state);
        let b = connect(&mut state);
        let mut outbox = Outbox::new();
        state.request_match(a.id(), user("alice"), &mut outbox).unwrap();

        let mut outbox = Outbox::new();
        let outcome = state.request_match(b.id(), user("bob"), &mut outbox).unwrap();

        assert!(matches!(outcome, MatchOutcome::Matched { peer, initiator: false, .. } if peer == a.id()));
        assert_eq!(state.lookup(a.id()).unwrap().state, SessionState::Matched { peer: b.id() });
        assert_eq!(state.lookup(b.id()).unwrap().state, SessionState::Matched { peer: a.id() });
        assert!(state.queued().is_empty());
        assert_symmetric(&state);

        assert_eq!(
            messages_for(&outbox, a.id()),
            vec![ServerMessage::match_found(b.id(), "bob", true)]
        );
        assert_eq!(
            messages_for(&outbox, b.id()),
            vec![ServerMessage::match_found(a.id(), "alice", false)]
        );
    }

    #[test]
    fn test_fifo_pairing_order() {
        let mut state = MatchState::new();
        let conns: Vec<_> = (0..4).map(|_| connect(&mut state)).collect();
        let mut outbox = Outbox::new();

        // Arrivals 1 and 3 wait, 2 pairs with 1, 4 pairs with 3
        for conn in &conns {
            state.request_match(conn.id(), user("u"), &mut outbox).unwrap();
        }

        assert_eq!(state.lookup(conns[0].id()).unwrap().state.peer(), Some(conns[1].id()));
        assert_eq!(state.lookup(conns[2].id()).unwrap().state.peer(), Some(conns[3].id()));
        assert_symmetric(&state);
    }

    #[test]
    fn test_repeated_request_never_self_matches() {
        let mut state = MatchState::new();
        let a = connect(&mut state);
        let mut outbox = Outbox::new();
        state.request_match(a.id(), user("a"), &mut outbox).unwrap();

        let mut outbox = Outbox::new();
        let outcome = state.request_match(a.id(), user("a"), &mut outbox).unwrap();

        assert_eq!(outcome, MatchOutcome::AlreadyWaiting);
        assert_eq!(state.queued(), vec![a.id()]);
        assert_eq!(state.lookup(a.id()).unwrap().state, SessionState::Waiting);
        assert_eq!(messages_for(&outbox, a.id()), vec![ServerMessage::Waiting]);
    }

    #[test]
    fn test_request_while_matched_is_invalid_state() {
        let mut state = MatchState::new();
        let a = connect(&mut state);
        let b = connect(&mut state);
        let mut outbox = Outbox::new();
        state.request_match(a.id(), user("a"), &mut outbox).unwrap();
        state.request_match(b.id(), user("b"), &mut outbox).unwrap();

        let mut outbox = Outbox::new();
        let err = state.request_match(a.id(), user("a"), &mut outbox).unwrap_err();

        assert!(matches!(err, SignalingError::InvalidState { state: "matched", .. }));
        assert!(outbox.is_empty());
        assert_eq!(state.lookup(a.id()).unwrap().state, SessionState::Matched { peer: b.id() });
        assert_symmetric(&state);
    }

    #[test]
    fn test_request_from_unknown_connection() {
        let mut state = MatchState::new();
        let id = ConnectionId::new();
        let mut outbox = Outbox::new();
        assert_eq!(
            state.request_match(id, user("x"), &mut outbox),
            Err(SignalingError::NotFound(id))
        );
    }

    #[test]
    fn test_cancel_waiting_returns_to_idle() {
        let mut state = MatchState::new();
        let a = connect(&mut state);
        let b = connect(&mut state);
        let mut outbox = Outbox::new();
        state.request_match(a.id(), user("a"), &mut outbox).unwrap();

        let mut outbox = Outbox::new();
        assert_eq!(state.cancel_match(a.id(), &mut outbox), Ok(CancelOutcome::Cancelled));
        assert_eq!(state.lookup(a.id()).unwrap().state, SessionState::Idle);
        assert!(state.queued().is_empty());
        assert_eq!(messages_for(&outbox, a.id()), vec![ServerMessage::MatchCancelled]);

        // Next arrival does not pair with the cancelled session
        let outcome = state.request_match(b.id(), user("b"), &mut outbox).unwrap();
        assert_eq!(outcome, MatchOutcome::Waiting);
    }

    #[test]
    fn test_cancel_when_not_waiting_is_acknowledged_noop() {
        let mut state = MatchState::new();
        let a = connect(&mut state);
        let b = connect(&mut state);
        let mut outbox = Outbox::new();

        assert_eq!(state.cancel_match(a.id(), &mut outbox), Ok(CancelOutcome::NotWaiting));

        state.request_match(a.id(), user("a"), &mut outbox).unwrap();
        state.request_match(b.id(), user("b"), &mut outbox).unwrap();
        let mut outbox = Outbox::new();
        assert_eq!(state.cancel_match(b.id(), &mut outbox), Ok(CancelOutcome::NotWaiting));
        assert_eq!(state.lookup(b.id()).unwrap().state, SessionState::Matched { peer: a.id() });
        assert_eq!(messages_for(&outbox, b.id()), vec![ServerMessage::MatchCancelled]);
    }

    #[test]
    fn test_initiator_is_earlier_registration() {
        let mut state = MatchState::new();
        let early = connect(&mut state);
        let late = connect(&mut state);
        let mut outbox = Outbox::new();

        // Late registration joins the queue first
        state.request_match(late.id(), user("late"), &mut outbox).unwrap();
        let outcome = state.request_match(early.id(), user("early"), &mut outbox).unwrap();

        assert!(matches!(outcome, MatchOutcome::Matched { initiator: true, .. }));
        assert_eq!(
            messages_for(&outbox, late.id()).last(),
            Some(&ServerMessage::match_found(early.id(), "early", false))
        );
    }

    #[test]
    fn test_stats() {
        let mut state = MatchState::new();
        let conns: Vec<_> = (0..4).map(|_| connect(&mut state)).collect();
        let mut outbox = Outbox::new();
        for conn in conns.iter().take(3) {
            state.request_match(conn.id(), user("u"), &mut outbox).unwrap();
        }

        let stats = state.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.waiting, 1);
        assert_eq!(stats.matched_pairs, 1);
        assert_eq!(stats.queue_length, 1);
    }
}
