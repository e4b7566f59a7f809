//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::matchmaking::HubStats;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// False once the hub has been drained for shutdown
    pub accepting: bool,
    pub sessions: HubStats,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let accepting = state.hub.is_accepting();
    let status = if accepting { "healthy" } else { "draining" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        accepting,
        sessions: state.hub.stats(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<HubStats> {
    Json(state.hub.stats())
}
