//! Pairing check for signaling messages

use std::sync::Arc;

use serde_json::Value;

use crate::websocket::ServerMessage;

use super::error::SignalingError;
use super::handle::ConnectionHandle;
use super::state::MatchState;
use super::types::{ConnectionId, SignalKind};

impl MatchState {
    /// Resolve the handle a signal from `from` to `to` may be delivered to.
    ///
    /// Succeeds only if `from` is matched and `to` is its registered peer.
    pub fn authorize_relay(
        &self,
        from: ConnectionId,
        to: ConnectionId,
    ) -> Result<Arc<ConnectionHandle>, SignalingError> {
        let sender = self.registry.lookup(from)?;
        if sender.state.peer() != Some(to) {
            return Err(SignalingError::UnknownPeer { from, to });
        }

        self.registry
            .lookup(to)
            .map(|peer| peer.handle.clone())
            .map_err(|_| SignalingError::UnknownPeer { from, to })
    }
}

/// Message delivered to the peer. The payload is passed through untouched.
pub fn signal_message(kind: SignalKind, from: ConnectionId, payload: Value) -> ServerMessage {
    match kind {
        SignalKind::Offer => ServerMessage::ReceiveOffer {
            from_id: from,
            payload,
        },
        SignalKind::Answer => ServerMessage::ReceiveAnswer {
            from_id: from,
            payload,
        },
        SignalKind::Candidate => ServerMessage::ReceiveCandidate {
            from_id: from,
            payload,
        },
    }
}
