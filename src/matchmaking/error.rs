use thiserror::Error;

use super::types::ConnectionId;

/// Failures of matchmaking and relay operations.
///
/// All of them are local to the connection that caused them; none leaves the
/// shared state changed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalingError {
    #[error("Connection {0} is already registered")]
    DuplicateRegistration(ConnectionId),

    #[error("Connection {0} is not registered")]
    NotFound(ConnectionId),

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("{to} is not the matched peer of {from}")]
    UnknownPeer { from: ConnectionId, to: ConnectionId },

    #[error("Peer {0} is no longer reachable")]
    PeerUnreachable(ConnectionId),

    #[error("Service is shutting down")]
    ShuttingDown,
}

impl SignalingError {
    /// Error code sent to the client
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateRegistration(_) => "DUPLICATE_REGISTRATION",
            Self::NotFound(_) => "NOT_REGISTERED",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::UnknownPeer { .. } => "UNKNOWN_PEER",
            Self::PeerUnreachable(_) => "PEER_UNREACHABLE",
            Self::ShuttingDown => "SHUTTING_DOWN",
        }
    }
}
