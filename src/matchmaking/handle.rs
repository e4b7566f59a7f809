//! Transport-side handle of one WebSocket connection

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{mpsc, watch};

use crate::websocket::ServerMessage;

use super::types::ConnectionId;

/// Handle for a single WebSocket connection
pub struct ConnectionHandle {
    pub id: ConnectionId,
    /// Subject of the admission token, when authentication is enabled
    pub subject: Option<String>,
    pub sender: mpsc::Sender<ServerMessage>,
    pub connected_at: DateTime<Utc>,
    /// Last activity timestamp (Unix seconds) - using AtomicI64 for lock-free updates
    last_activity: AtomicI64,
    evicted: watch::Sender<bool>,
}

impl ConnectionHandle {
    pub fn new(subject: Option<String>, sender: mpsc::Sender<ServerMessage>) -> Self {
        let now = Utc::now();
        let (evicted, _) = watch::channel(false);
        Self {
            id: ConnectionId::new(),
            subject,
            sender,
            connected_at: now,
            last_activity: AtomicI64::new(now.timestamp()),
            evicted,
        }
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.last_activity.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }

    #[cfg(test)]
    pub(crate) fn set_last_activity(&self, at: DateTime<Utc>) {
        self.last_activity.store(at.timestamp(), Ordering::Relaxed);
    }

    pub async fn send(
        &self,
        message: ServerMessage,
    ) -> Result<(), mpsc::error::SendError<ServerMessage>> {
        self.sender.send(message).await
    }

    /// Ask the transport to flush pending messages and close the socket.
    pub fn evict(&self) {
        self.evicted.send_replace(true);
    }

    pub fn is_evicted(&self) -> bool {
        *self.evicted.borrow()
    }

    /// Receiver that resolves through [`wait_evicted`] once [`Self::evict`] is called.
    pub fn eviction_signal(&self) -> watch::Receiver<bool> {
        self.evicted.subscribe()
    }
}

/// Resolves when the handle owning `signal` is evicted or dropped.
pub async fn wait_evicted(mut signal: watch::Receiver<bool>) {
    loop {
        let evicted = *signal.borrow_and_update();
        if evicted {
            return;
        }
        if signal.changed().await.is_err() {
            return;
        }
    }
}
