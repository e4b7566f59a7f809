use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::config::WebSocketConfig;
use crate::matchmaking::SignalingHub;
use crate::metrics::HeartbeatMetrics;
use crate::websocket::ServerMessage;

/// Maximum concurrent heartbeat sends to avoid overwhelming the system
const MAX_CONCURRENT_HEARTBEATS: usize = 1000;

/// Background task for heartbeat and stale connection cleanup
pub struct HeartbeatTask {
    config: WebSocketConfig,
    hub: Arc<SignalingHub>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        hub: Arc<SignalingHub>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            hub,
            shutdown,
        }
    }

    /// Run the heartbeat and cleanup timers until shutdown
    pub async fn run(mut self) {
        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval.max(1));
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval.max(1));
        let connection_timeout = self.config.connection_timeout;

        let mut heartbeat_timer = tokio::time::interval(heartbeat_interval);
        let mut cleanup_timer = tokio::time::interval(cleanup_interval);

        // Skip immediate first tick
        heartbeat_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.config.heartbeat_interval,
            cleanup_interval_secs = self.config.cleanup_interval,
            connection_timeout_secs = connection_timeout,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_heartbeats().await;
                }
                _ = cleanup_timer.tick() => {
                    self.cleanup_stale_connections(connection_timeout).await;
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    /// Send a heartbeat to every registered connection, in parallel batches.
    /// The writer puts a transport Ping in front of each one.
    async fn send_heartbeats(&self) {
        let connections = self.hub.connections();
        let total_count = connections.len();

        if total_count == 0 {
            return;
        }

        let start = Instant::now();
        let send_timeout = Duration::from_millis(self.config.send_timeout_ms);
        let sent = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let timed_out = Arc::new(AtomicUsize::new(0));

        for batch in connections.chunks(MAX_CONCURRENT_HEARTBEATS) {
            let futures: Vec<_> = batch
                .iter()
                .map(|handle| {
                    let sent = sent.clone();
                    let failed = failed.clone();
                    let timed_out = timed_out.clone();
                    let handle = handle.clone();

                    async move {
                        match timeout(send_timeout, handle.send(ServerMessage::Heartbeat)).await {
                            Ok(Ok(_)) => {
                                sent.fetch_add(1, Ordering::Relaxed);
                            }
                            Ok(Err(_)) => {
                                failed.fetch_add(1, Ordering::Relaxed);
                                tracing::debug!(
                                    connection_id = %handle.id,
                                    "Failed to send heartbeat, connection may be dead"
                                );
                            }
                            Err(_) => {
                                timed_out.fetch_add(1, Ordering::Relaxed);
                                tracing::debug!(
                                    connection_id = %handle.id,
                                    timeout_ms = send_timeout.as_millis() as u64,
                                    "Heartbeat send timed out"
                                );
                            }
                        }
                    }
                })
                .collect();

            join_all(futures).await;
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let timed_out_count = timed_out.load(Ordering::Relaxed);

        HeartbeatMetrics::record_duration_ms(elapsed_ms);
        if timed_out_count > 0 {
            HeartbeatMetrics::record_timeouts(timed_out_count as u64);
        }

        tracing::debug!(
            total = total_count,
            sent = sent.load(Ordering::Relaxed),
            failed = failed.load(Ordering::Relaxed),
            timed_out = timed_out_count,
            elapsed_ms = elapsed_ms,
            "Heartbeat round completed"
        );

        if elapsed_ms > (self.config.heartbeat_interval * 1000 / 2) {
            tracing::warn!(
                elapsed_ms = elapsed_ms,
                heartbeat_interval_ms = self.config.heartbeat_interval * 1000,
                connections = total_count,
                "Heartbeat round took more than 50% of interval"
            );
        }
    }

    /// Run the disconnect sequence for connections idle past the timeout
    async fn cleanup_stale_connections(&self, timeout_secs: u64) {
        let removed = self.hub.evict_stale(timeout_secs).await;

        if removed > 0 {
            HeartbeatMetrics::record_evicted(removed as u64);
            tracing::info!(
                removed = removed,
                timeout_secs = timeout_secs,
                "Cleaned up stale connections"
            );
        }
    }
}
