//! Connection registry: connection id -> session record

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use super::error::SignalingError;
use super::handle::ConnectionHandle;
use super::types::{ConnectionId, SessionInfo, SessionState, UserInfo};

/// Server-side record of one live connection
pub struct Session {
    pub handle: Arc<ConnectionHandle>,
    /// Registration order, used to pick the offer initiator of a pair
    pub registration_seq: u64,
    pub user: Option<UserInfo>,
    pub state: SessionState,
    pub waiting_since: Option<Instant>,
}

impl Session {
    pub fn id(&self) -> ConnectionId {
        self.handle.id
    }

    pub fn display_name(&self) -> &str {
        self.user
            .as_ref()
            .map(|u| u.display_name.as_str())
            .unwrap_or_default()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id(),
            registration_seq: self.registration_seq,
            user: self.user.clone(),
            state: self.state,
        }
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: HashMap<ConnectionId, Session>,
    next_seq: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an idle session for the handle's connection id
    pub fn register(&mut self, handle: Arc<ConnectionHandle>) -> Result<&Session, SignalingError> {
        let id = handle.id;
        if self.sessions.contains_key(&id) {
            return Err(SignalingError::DuplicateRegistration(id));
        }

        self.next_seq += 1;
        let session = Session {
            handle,
            registration_seq: self.next_seq,
            user: None,
            state: SessionState::Idle,
            waiting_since: None,
        };
        Ok(self.sessions.entry(id).or_insert(session))
    }

    pub fn lookup(&self, id: ConnectionId) -> Result<&Session, SignalingError> {
        self.sessions.get(&id).ok_or(SignalingError::NotFound(id))
    }

    pub fn lookup_mut(&mut self, id: ConnectionId) -> Result<&mut Session, SignalingError> {
        self.sessions.get_mut(&id).ok_or(SignalingError::NotFound(id))
    }

    /// Only the lifecycle cleanup in `MatchState` may call this.
    pub(super) fn remove(&mut self, id: ConnectionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    pub(super) fn drain(&mut self) -> Vec<Session> {
        self.sessions.drain().map(|(_, session)| session).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }
}
