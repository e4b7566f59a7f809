//! Prometheus metrics for the signaling service.
//!
//! - Session metrics (registered, waiting, matched pairs)
//! - Matchmaking metrics (matches, queue wait, cancellations, peer-left)
//! - Relay metrics (forwarded and rejected signals)
//! - WebSocket and heartbeat metrics

mod helpers;

pub use helpers::{
    encode_metrics, ConnectionMetrics, HeartbeatMetrics, HubMetrics, MatchMetrics, RelayMetrics,
    WsMessageMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "signal";

lazy_static! {
    // ============================================================================
    // Session Metrics
    // ============================================================================

    /// Registered sessions in any state
    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_sessions_active", METRIC_PREFIX),
        "Number of registered sessions"
    ).unwrap();

    /// Sessions waiting in the matchmaking queue
    pub static ref SESSIONS_WAITING: IntGauge = register_int_gauge!(
        format!("{}_sessions_waiting", METRIC_PREFIX),
        "Number of sessions waiting for a peer"
    ).unwrap();

    pub static ref MATCHED_PAIRS: IntGauge = register_int_gauge!(
        format!("{}_matched_pairs", METRIC_PREFIX),
        "Number of currently matched pairs"
    ).unwrap();

    // ============================================================================
    // Matchmaking Metrics
    // ============================================================================

    pub static ref MATCHES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_matches_total", METRIC_PREFIX),
        "Total pairs formed"
    ).unwrap();

    pub static ref QUEUE_ENQUEUED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_queue_enqueued_total", METRIC_PREFIX),
        "Total sessions that entered the waiting queue"
    ).unwrap();

    /// Time the earlier party spent in the queue before being paired
    pub static ref QUEUE_WAIT_SECONDS: Histogram = register_histogram!(
        format!("{}_queue_wait_seconds", METRIC_PREFIX),
        "Time spent waiting for a peer in seconds",
        vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]
    ).unwrap();

    pub static ref MATCH_CANCELLED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_match_cancelled_total", METRIC_PREFIX),
        "Total matchmaking requests cancelled while waiting"
    ).unwrap();

    pub static ref PEER_LEFT_TOTAL: IntCounter = register_int_counter!(
        format!("{}_peer_left_total", METRIC_PREFIX),
        "Total peer-left notifications sent"
    ).unwrap();

    // ============================================================================
    // Relay Metrics
    // ============================================================================

    /// Signals forwarded to a matched peer, by kind
    pub static ref SIGNALS_RELAYED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_signals_relayed_total", METRIC_PREFIX),
        "Total signaling messages forwarded",
        &["kind"]
    ).unwrap();

    /// Signals refused, by error code
    pub static ref SIGNALS_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_signals_rejected_total", METRIC_PREFIX),
        "Total signaling messages rejected",
        &["reason"]
    ).unwrap();

    // ============================================================================
    // WebSocket Metrics
    // ============================================================================

    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// WebSocket messages received from clients
    pub static ref WS_MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_messages_received_total", METRIC_PREFIX),
        "Total WebSocket messages received from clients",
        &["type"]
    ).unwrap();

    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection duration in seconds",
        vec![1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0]
    ).unwrap();

    // ============================================================================
    // Heartbeat Metrics
    // ============================================================================

    /// Heartbeat round duration in milliseconds
    pub static ref HEARTBEAT_DURATION_MS: Histogram = register_histogram!(
        format!("{}_heartbeat_duration_ms", METRIC_PREFIX),
        "Heartbeat round duration in milliseconds",
        vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    ).unwrap();

    pub static ref HEARTBEAT_TIMEOUTS: IntCounter = register_int_counter!(
        format!("{}_heartbeat_timeouts_total", METRIC_PREFIX),
        "Total heartbeat send timeouts"
    ).unwrap();

    pub static ref STALE_EVICTIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_stale_evictions_total", METRIC_PREFIX),
        "Total connections removed for inactivity"
    ).unwrap();
}
