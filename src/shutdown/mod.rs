//! Graceful shutdown for the signaling service.
//!
//! 1. Drains the hub so no further connections register
//! 2. Sends `shutdown` to every drained client and asks its transport to close
//! 3. Stops background tasks
//! 4. Waits for the transports to finish closing

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::config::ShutdownSettings;
use crate::matchmaking::{ConnectionHandle, SignalingHub};
use crate::websocket::ServerMessage;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for clients to be notified (default: 5 seconds)
    pub client_notification_timeout: Duration,
    /// Time to wait for transports to close (default: 10 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self::from(&ShutdownSettings::default())
    }
}

impl From<&ShutdownSettings> for ShutdownConfig {
    fn from(settings: &ShutdownSettings) -> Self {
        Self {
            client_notification_timeout: Duration::from_secs(
                settings.client_notification_timeout_secs,
            ),
            drain_timeout: Duration::from_secs(settings.drain_timeout_secs),
        }
    }
}

/// Handles graceful shutdown of the signaling service
pub struct GracefulShutdown {
    hub: Arc<SignalingHub>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(hub: Arc<SignalingHub>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::with_config(hub, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(
        hub: Arc<SignalingHub>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            hub,
            shutdown_tx,
            config,
        }
    }

    /// Execute graceful shutdown sequence
    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_sessions = self.hub.stats().total)
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();

        // Phase 1: Stop accepting and empty registry and queue
        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Draining sessions");
        let handles = self.hub.drain();
        result.sessions_drained = handles.len();

        // Phase 2: Tell every client why, then close its transport
        tracing::info!("Phase 2: Notifying clients");
        result.clients_notified = self.notify_clients(&handles, reason).await;
        for handle in &handles {
            handle.evict();
        }

        // Phase 3: Signal background tasks to stop
        tracing::info!("Phase 3: Signaling background tasks to stop");
        let _ = self.shutdown_tx.send(());

        // Phase 4: Wait briefly for transports to close
        tracing::info!("Phase 4: Waiting for connections to close");
        result.connections_closed = self.wait_for_connections_to_close(&handles).await;

        result.duration = start.elapsed();
        result.success = true;

        tracing::info!(
            sessions_drained = result.sessions_drained,
            clients_notified = result.clients_notified,
            connections_closed = result.connections_closed,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }

    async fn notify_clients(&self, handles: &[Arc<ConnectionHandle>], reason: &str) -> usize {
        if handles.is_empty() {
            return 0;
        }

        tracing::info!(
            total_connections = handles.len(),
            "Sending shutdown notifications to clients"
        );

        let message = ServerMessage::shutdown(reason);
        let per_send = self.config.client_notification_timeout;
        let mut futures = FuturesUnordered::new();
        let mut notified = 0;

        for conn in handles {
            let msg = message.clone();
            futures.push(async move {
                match timeout(per_send, conn.send(msg)).await {
                    Ok(Ok(_)) => true,
                    Ok(Err(e)) => {
                        tracing::debug!(
                            connection_id = %conn.id,
                            error = %e,
                            "Failed to send shutdown notification"
                        );
                        false
                    }
                    Err(_) => {
                        tracing::debug!(
                            connection_id = %conn.id,
                            "Timeout sending shutdown notification"
                        );
                        false
                    }
                }
            });
        }

        // Process all notifications with overall timeout
        let notify_future = async {
            while let Some(success) = futures.next().await {
                if success {
                    notified += 1;
                }
            }
        };

        let _ = timeout(self.config.client_notification_timeout, notify_future).await;

        tracing::info!(
            notified = notified,
            total = handles.len(),
            "Shutdown notifications sent"
        );

        notified
    }

    /// A transport has closed once its outbound receiver is dropped
    async fn wait_for_connections_to_close(&self, handles: &[Arc<ConnectionHandle>]) -> usize {
        if handles.is_empty() {
            return 0;
        }

        let wait_future = async {
            let mut closing: FuturesUnordered<_> =
                handles.iter().map(|h| h.sender.closed()).collect();
            while closing.next().await.is_some() {}
        };

        let _ = timeout(self.config.drain_timeout, wait_future).await;

        let closed = handles.iter().filter(|h| h.sender.is_closed()).count();
        let remaining = handles.len() - closed;

        if remaining > 0 {
            tracing::warn!(
                remaining_connections = remaining,
                "Some connections did not close gracefully"
            );
        }

        closed
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether shutdown completed successfully
    pub success: bool,
    /// Sessions removed from the hub
    pub sessions_drained: usize,
    /// Number of clients that were notified
    pub clients_notified: usize,
    /// Number of connections that closed within the drain timeout
    pub connections_closed: usize,
    /// Total time taken for shutdown
    pub duration: Duration,
}
