//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use crate::matchmaking::{HubStats, SignalKind};

use super::{
    HEARTBEAT_DURATION_MS, HEARTBEAT_TIMEOUTS, MATCHED_PAIRS, MATCHES_TOTAL,
    MATCH_CANCELLED_TOTAL, PEER_LEFT_TOTAL, QUEUE_ENQUEUED_TOTAL, QUEUE_WAIT_SECONDS,
    SESSIONS_ACTIVE, SESSIONS_WAITING, SIGNALS_REJECTED_TOTAL, SIGNALS_RELAYED_TOTAL,
    STALE_EVICTIONS_TOTAL, WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED, WS_CONNECTION_DURATION,
    WS_MESSAGES_RECEIVED,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Session gauges, refreshed from a hub snapshot
pub struct HubMetrics;

impl HubMetrics {
    pub fn record(stats: &HubStats) {
        SESSIONS_ACTIVE.set(stats.total as i64);
        SESSIONS_WAITING.set(stats.waiting as i64);
        MATCHED_PAIRS.set(stats.matched_pairs as i64);
    }
}

/// Helper struct for recording matchmaking metrics
pub struct MatchMetrics;

impl MatchMetrics {
    /// Record a pair formed; `waited` is the queue time of the earlier party
    pub fn record_matched(waited: Option<Duration>) {
        MATCHES_TOTAL.inc();
        if let Some(waited) = waited {
            QUEUE_WAIT_SECONDS.observe(waited.as_secs_f64());
        }
    }

    pub fn record_enqueued() {
        QUEUE_ENQUEUED_TOTAL.inc();
    }

    pub fn record_cancelled() {
        MATCH_CANCELLED_TOTAL.inc();
    }

    pub fn record_peer_left() {
        PEER_LEFT_TOTAL.inc();
    }
}

/// Helper struct for recording relay metrics
pub struct RelayMetrics;

impl RelayMetrics {
    pub fn record_relayed(kind: SignalKind) {
        SIGNALS_RELAYED_TOTAL
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    /// Record a refused relay, labelled with the error code
    pub fn record_rejected(reason: &str) {
        SIGNALS_REJECTED_TOTAL.with_label_values(&[reason]).inc();
    }
}

/// Helper struct for WebSocket connection metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened() {
        WS_CONNECTIONS_OPENED.inc();
    }

    /// Record a closed connection and how long it was open
    pub fn record_closed(duration: Duration) {
        WS_CONNECTIONS_CLOSED.inc();
        WS_CONNECTION_DURATION.observe(duration.as_secs_f64());
    }
}

/// Helper struct for recording WebSocket message metrics
pub struct WsMessageMetrics;

impl WsMessageMetrics {
    /// Record a client message by its wire type
    pub fn record(message_type: &str) {
        WS_MESSAGES_RECEIVED
            .with_label_values(&[message_type])
            .inc();
    }

    pub fn record_invalid() {
        WS_MESSAGES_RECEIVED.with_label_values(&["invalid"]).inc();
    }
}

/// Helper struct for heartbeat metrics
pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    /// Record heartbeat round duration
    pub fn record_duration_ms(duration_ms: u64) {
        HEARTBEAT_DURATION_MS.observe(duration_ms as f64);
    }

    /// Record heartbeat timeouts
    pub fn record_timeouts(count: u64) {
        HEARTBEAT_TIMEOUTS.inc_by(count);
    }

    pub fn record_evicted(count: u64) {
        STALE_EVICTIONS_TOTAL.inc_by(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_metrics_mirror_stats() {
        let stats = HubStats {
            total: 5,
            idle: 1,
            waiting: 2,
            matched_pairs: 1,
            queue_length: 2,
        };
        HubMetrics::record(&stats);
        // Other tests share the global registry, so only check the text is present
        assert!(encode_metrics().unwrap().contains("signal_matched_pairs"));
    }

    #[test]
    fn test_match_and_relay_metrics() {
        let before = MATCHES_TOTAL.get();
        MatchMetrics::record_matched(Some(Duration::from_millis(1500)));
        MatchMetrics::record_matched(None);
        assert!(MATCHES_TOTAL.get() >= before + 2);

        MatchMetrics::record_enqueued();
        MatchMetrics::record_cancelled();
        MatchMetrics::record_peer_left();
        RelayMetrics::record_relayed(SignalKind::Candidate);
        RelayMetrics::record_rejected("INVALID_STATE");
        // Just verify no panics
    }

    #[test]
    fn test_ws_and_heartbeat_metrics() {
        ConnectionMetrics::record_opened();
        ConnectionMetrics::record_closed(Duration::from_secs(42));
        WsMessageMetrics::record("join-matchmaking");
        WsMessageMetrics::record_invalid();
        HeartbeatMetrics::record_duration_ms(12);
        HeartbeatMetrics::record_timeouts(1);
        HeartbeatMetrics::record_evicted(2);
        // Just verify no panics
    }
}
