//! Prometheus metrics endpoint.

use axum::{extract::State, http::header, response::IntoResponse};

use crate::error::AppError;
use crate::metrics::{self, HubMetrics};
use crate::server::AppState;

/// GET /metrics - Prometheus metrics endpoint
pub async fn prometheus_metrics(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    // Gauges are refreshed on every hub operation; refresh again so an idle
    // process still reports current numbers
    HubMetrics::record(&state.hub.stats());

    let output = metrics::encode_metrics()
        .map_err(|e| AppError::Internal(format!("Failed to encode metrics: {}", e)))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        output,
    ))
}
