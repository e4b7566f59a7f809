//! Identifiers and state types shared by the matchmaking components

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of one live connection. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Matchmaking state of a session.
///
/// The peer id only exists in `Matched`, so a session can never carry a
/// stale peer reference while idle or waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Waiting,
    Matched { peer: ConnectionId },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Matched { .. } => "matched",
        }
    }

    pub fn peer(&self) -> Option<ConnectionId> {
        match self {
            Self::Matched { peer } => Some(*peer),
            _ => None,
        }
    }
}

/// Identifying info a client supplies when it joins matchmaking.
/// Not validated here.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: String,
    pub display_name: String,
}

impl UserInfo {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// The three kinds of signaling messages the relay forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of a session, safe to hand out after the lock is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: ConnectionId,
    pub registration_seq: u64,
    pub user: Option<UserInfo>,
    pub state: SessionState,
}

/// Session and queue counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub total: usize,
    pub idle: usize,
    pub waiting: usize,
    pub matched_pairs: usize,
    pub queue_length: usize,
}
