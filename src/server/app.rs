use axum::{http::HeaderValue, routing::get, Router};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::api::api_routes;
use crate::websocket::ws_handler;

use super::AppState;

pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.server.cors_origins);

    Router::new()
        // WebSocket endpoint
        .route("/ws", get(ws_handler))
        // Merge API routes
        .merge(api_routes())
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Add state
        .with_state(state)
}

/// Any origin unless an explicit list is configured
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(allowed))
}
