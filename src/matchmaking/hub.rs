use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::timeout;

use crate::config::WebSocketConfig;
use crate::metrics::{HubMetrics, MatchMetrics, RelayMetrics};

use super::error::SignalingError;
use super::handle::ConnectionHandle;
use super::lifecycle::RemovedSession;
use super::relay::signal_message;
use super::state::{CancelOutcome, MatchOutcome, MatchState, Outbox};
use super::types::{ConnectionId, HubStats, SessionInfo, SignalKind, UserInfo};

/// Default timeout for relaying a signal to a peer
const DEFAULT_SEND_TIMEOUT_MS: u64 = 5000;

/// Process-wide matchmaking service.
///
/// Registry and queue sit behind one mutex, so pairing, relay checks and
/// cleanup are serialized. The lock is never held across an `.await`.
/// State notifications (`waiting`, `match-found`, `peer-left`, ...) are
/// queued with `try_send` before the lock is released, so every connection
/// sees them in the order the state changed. A connection whose buffer is
/// full at that point is evicted.
pub struct SignalingHub {
    state: Mutex<MatchState>,
    send_timeout: Duration,
}

impl SignalingHub {
    pub fn new() -> Self {
        Self::with_send_timeout(Duration::from_millis(DEFAULT_SEND_TIMEOUT_MS))
    }

    pub fn from_config(config: &WebSocketConfig) -> Self {
        Self::with_send_timeout(Duration::from_millis(config.send_timeout_ms))
    }

    pub fn with_send_timeout(send_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(MatchState::new()),
            send_timeout,
        }
    }

    /// Register a new connection as an idle session
    pub fn register(&self, handle: Arc<ConnectionHandle>) -> Result<SessionInfo, SignalingError> {
        let id = handle.id;
        let result = self.state.lock().register(handle);
        match &result {
            Ok(_) => {
                tracing::info!(connection_id = %id, "Session registered");
                self.record_stats();
            }
            Err(e) => {
                tracing::warn!(connection_id = %id, error = %e, "Session registration rejected");
            }
        }
        result
    }

    pub fn lookup(&self, id: ConnectionId) -> Result<SessionInfo, SignalingError> {
        self.state.lock().lookup(id)
    }

    pub async fn request_match(
        &self,
        id: ConnectionId,
        user: UserInfo,
    ) -> Result<MatchOutcome, SignalingError> {
        let result = {
            let mut state = self.state.lock();
            let mut outbox = Outbox::new();
            let result = state.request_match(id, user, &mut outbox);
            flush(outbox);
            result
        };

        match &result {
            Ok(MatchOutcome::Matched { waited, .. }) => MatchMetrics::record_matched(*waited),
            Ok(MatchOutcome::Waiting) => MatchMetrics::record_enqueued(),
            _ => {}
        }
        self.record_stats();
        result
    }

    pub async fn cancel_match(&self, id: ConnectionId) -> Result<CancelOutcome, SignalingError> {
        let result = {
            let mut state = self.state.lock();
            let mut outbox = Outbox::new();
            let result = state.cancel_match(id, &mut outbox);
            flush(outbox);
            result
        };

        if let Ok(CancelOutcome::Cancelled) = result {
            tracing::info!(connection_id = %id, "Matchmaking cancelled");
            MatchMetrics::record_cancelled();
        }
        self.record_stats();
        result
    }

    /// Forward a signaling payload from `from` to its matched peer `to`.
    ///
    /// The pairing check runs under the lock; the delivery does not.
    pub async fn relay(
        &self,
        from: ConnectionId,
        to: ConnectionId,
        kind: SignalKind,
        payload: Value,
    ) -> Result<(), SignalingError> {
        let peer = match self.state.lock().authorize_relay(from, to) {
            Ok(peer) => peer,
            Err(e) => {
                tracing::warn!(
                    connection_id = %from,
                    target_id = %to,
                    kind = %kind,
                    error = %e,
                    "Relay rejected"
                );
                RelayMetrics::record_rejected(e.code());
                return Err(e);
            }
        };

        let message = signal_message(kind, from, payload);
        match timeout(self.send_timeout, peer.send(message)).await {
            Ok(Ok(())) => {
                tracing::debug!(connection_id = %from, peer_id = %to, kind = %kind, "Signal relayed");
                RelayMetrics::record_relayed(kind);
                Ok(())
            }
            Ok(Err(_)) | Err(_) => {
                tracing::warn!(
                    connection_id = %from,
                    peer_id = %to,
                    kind = %kind,
                    "Peer unreachable, signal dropped"
                );
                let err = SignalingError::PeerUnreachable(to);
                RelayMetrics::record_rejected(err.code());
                Err(err)
            }
        }
    }

    /// Run the disconnect sequence for `id`. Returns `None` if the session
    /// was already gone.
    pub async fn disconnect(&self, id: ConnectionId) -> Option<RemovedSession> {
        let removed = {
            let mut state = self.state.lock();
            let mut outbox = Outbox::new();
            let removed = state.remove(id, &mut outbox);
            flush(outbox);
            removed
        };

        if let Some(ref removed) = removed {
            if removed.notified_peer.is_some() {
                MatchMetrics::record_peer_left();
            }
            tracing::info!(
                connection_id = %id,
                state = removed.state.name(),
                "Session unregistered"
            );
        }
        self.record_stats();
        removed
    }

    /// Disconnect every connection idle for longer than `timeout_secs` and
    /// close its transport. Returns the number removed.
    pub async fn evict_stale(&self, timeout_secs: u64) -> usize {
        let stale = self.state.lock().find_stale(timeout_secs);
        let mut removed = 0;

        for id in stale {
            if let Some(session) = self.disconnect(id).await {
                tracing::info!(connection_id = %id, "Removing stale connection due to timeout");
                session.handle.evict();
                removed += 1;
            }
        }

        removed
    }

    /// Remove all sessions and reject further registrations.
    pub fn drain(&self) -> Vec<Arc<ConnectionHandle>> {
        let handles = self.state.lock().drain();
        tracing::info!(sessions = handles.len(), "Signaling hub drained");
        self.record_stats();
        handles
    }

    pub fn is_accepting(&self) -> bool {
        self.state.lock().is_accepting()
    }

    pub fn stats(&self) -> HubStats {
        self.state.lock().stats()
    }

    pub fn connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.state.lock().connections()
    }

    /// Waiting connections, oldest first
    pub fn queued(&self) -> Vec<ConnectionId> {
        self.state.lock().queued()
    }

    fn record_stats(&self) {
        HubMetrics::record(&self.stats());
    }
}

/// Queue every delivery without waiting. Runs while the state lock is held.
fn flush(outbox: Outbox) {
    for delivery in outbox {
        let to = delivery.to;
        match to.sender.try_send(delivery.message) {
            Ok(()) => {}
            Err(TrySendError::Closed(_)) => {
                // Transport is gone; its disconnect follows
                tracing::debug!(connection_id = %to.id, "Delivery failed, connection closed");
            }
            Err(TrySendError::Full(message)) => {
                tracing::warn!(
                    connection_id = %to.id,
                    message = ?message,
                    "Outbound buffer full, evicting slow connection"
                );
                to.evict();
            }
        }
    }
}

impl Default for SignalingHub {
    fn default() -> Self {
        Self::new()
    }
}
