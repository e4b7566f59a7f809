//! HTTP endpoint tests against the assembled router

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

use match_signaling_service::config::Settings;
use match_signaling_service::matchmaking::{ConnectionHandle, UserInfo};
use match_signaling_service::server::{create_app, AppState};

async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(app, uri).await;
    (status, serde_json::from_str(&body).unwrap())
}

#[tokio::test]
async fn test_health_reports_accepting() {
    let state = AppState::new(Settings::default());
    let (status, body) = get_json(create_app(state), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["accepting"], true);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["sessions"]["total"], 0);
}

#[tokio::test]
async fn test_stats_reflect_hub_state() {
    let state = AppState::new(Settings::default());

    let mut receivers = Vec::new();
    let mut handles = Vec::new();
    for _ in 0..3 {
        let (tx, rx) = mpsc::channel(8);
        let handle = Arc::new(ConnectionHandle::new(None, tx));
        state.hub.register(handle.clone()).unwrap();
        receivers.push(rx);
        handles.push(handle);
    }
    for (i, handle) in handles.iter().enumerate() {
        state
            .hub
            .request_match(handle.id, UserInfo::new(i.to_string(), format!("user{}", i)))
            .await
            .unwrap();
    }

    let (status, body) = get_json(create_app(state), "/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["matched_pairs"], 1);
    assert_eq!(body["waiting"], 1);
    assert_eq!(body["queue_length"], 1);
    assert_eq!(body["idle"], 0);
}

#[tokio::test]
async fn test_health_after_drain() {
    let state = AppState::new(Settings::default());
    state.hub.drain();

    let (status, body) = get_json(create_app(state), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "draining");
    assert_eq!(body["accepting"], false);
}

#[tokio::test]
async fn test_metrics_exposition() {
    let state = AppState::new(Settings::default());
    let (status, body) = get(create_app(state), "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("signal_sessions_active"));
}
