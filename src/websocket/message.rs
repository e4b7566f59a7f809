use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::matchmaking::{ConnectionId, SignalKind, SignalingError};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    JoinMatchmaking { user_id: String, username: String },
    CancelMatchmaking,
    #[serde(rename_all = "camelCase")]
    SendOffer { peer_id: ConnectionId, payload: Value },
    #[serde(rename_all = "camelCase")]
    SendAnswer { peer_id: ConnectionId, payload: Value },
    #[serde(rename_all = "camelCase")]
    SendCandidate { peer_id: ConnectionId, payload: Value },
    Ping,
}

impl ClientMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinMatchmaking { .. } => "join-matchmaking",
            Self::CancelMatchmaking => "cancel-matchmaking",
            Self::SendOffer { .. } => "send-offer",
            Self::SendAnswer { .. } => "send-answer",
            Self::SendCandidate { .. } => "send-candidate",
            Self::Ping => "ping",
        }
    }

    /// Split a signaling message into its relay parts
    pub fn into_signal(self) -> Option<(SignalKind, ConnectionId, Value)> {
        match self {
            Self::SendOffer { peer_id, payload } => Some((SignalKind::Offer, peer_id, payload)),
            Self::SendAnswer { peer_id, payload } => Some((SignalKind::Answer, peer_id, payload)),
            Self::SendCandidate { peer_id, payload } => {
                Some((SignalKind::Candidate, peer_id, payload))
            }
            _ => None,
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Connected { connection_id: ConnectionId },
    Waiting,
    #[serde(rename_all = "camelCase")]
    MatchFound {
        peer_id: ConnectionId,
        peer_username: String,
        /// True for exactly one side of the pair: the one that sends the offer
        initiator: bool,
    },
    MatchCancelled,
    #[serde(rename_all = "camelCase")]
    ReceiveOffer { from_id: ConnectionId, payload: Value },
    #[serde(rename_all = "camelCase")]
    ReceiveAnswer { from_id: ConnectionId, payload: Value },
    #[serde(rename_all = "camelCase")]
    ReceiveCandidate { from_id: ConnectionId, payload: Value },
    PeerLeft,
    Pong,
    Heartbeat,
    Shutdown { reason: String },
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn match_found(
        peer_id: ConnectionId,
        peer_username: impl Into<String>,
        initiator: bool,
    ) -> Self {
        Self::MatchFound {
            peer_id,
            peer_username: peer_username.into(),
            initiator,
        }
    }

    pub fn shutdown(reason: impl Into<String>) -> Self {
        Self::Shutdown {
            reason: reason.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&SignalingError> for ServerMessage {
    fn from(err: &SignalingError) -> Self {
        Self::error(err.code(), err.to_string())
    }
}
