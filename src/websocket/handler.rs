use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::matchmaking::{wait_evicted, ConnectionHandle, SignalingError, UserInfo};
use crate::metrics::{ConnectionMetrics, WsMessageMetrics};
use crate::server::AppState;

use super::message::{ClientMessage, ServerMessage};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers),
    fields(has_query_token = query.token.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    if !state.hub.is_accepting() {
        return AppError::from(SignalingError::ShuttingDown).into_response();
    }

    let subject = match authenticate(&state, &query, &headers) {
        Ok(subject) => subject,
        Err(e) => return e.into_response(),
    };

    tracing::debug!(subject = ?subject, "WebSocket upgrade requested");

    ws.on_upgrade(move |socket| handle_socket(socket, state, subject))
}

/// Admission check. Returns the token subject, or `None` when no secret is
/// configured and connections are accepted as-is.
fn authenticate(
    state: &AppState,
    query: &WsQuery,
    headers: &HeaderMap,
) -> Result<Option<String>, AppError> {
    let Some(validator) = state.jwt_validator.as_ref() else {
        return Ok(None);
    };

    let token = extract_token(query, headers)
        .ok_or_else(|| AppError::Auth("Missing authentication token".to_string()))?;

    let claims = validator.validate(&token)?;
    Ok(Some(claims.sub))
}

/// Extract token from query parameter or Authorization header
fn extract_token(query: &WsQuery, headers: &HeaderMap) -> Option<String> {
    // First try query parameter
    if let Some(ref token) = query.token {
        return Some(token.clone());
    }

    // Then try Authorization header
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    None
}

/// WebSocket frames for one outbound message. A `heartbeat` is preceded by
/// a transport Ping; the client's Pong counts as activity.
fn outbound_frames(msg: &ServerMessage) -> Vec<Message> {
    let text = match msg.to_json() {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize message");
            return Vec::new();
        }
    };

    let mut frames = Vec::with_capacity(2);
    if matches!(msg, ServerMessage::Heartbeat) {
        frames.push(Message::Ping(Bytes::new()));
    }
    frames.push(Message::Text(text.into()));
    frames
}

async fn send_message(
    ws_sender: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    for frame in outbound_frames(msg) {
        ws_sender.send(frame).await?;
    }
    Ok(())
}

/// Register the session and tell the client its id
async fn register_connection(
    state: &AppState,
    handle: &Arc<ConnectionHandle>,
) -> Result<(), SignalingError> {
    state.hub.register(handle.clone())?;

    ConnectionMetrics::record_opened();
    tracing::info!(connection_id = %handle.id, "WebSocket connection established");

    let _ = handle
        .send(ServerMessage::Connected {
            connection_id: handle.id,
        })
        .await;
    Ok(())
}

/// Handle an established WebSocket connection
#[tracing::instrument(name = "ws.connection", skip(socket, state))]
async fn handle_socket(socket: WebSocket, state: AppState, subject: Option<String>) {
    let connection_start = Instant::now();
    let buffer = state.settings.websocket.channel_buffer_size.max(1);

    // Create channel for sending messages to this connection
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(buffer);
    let handle = Arc::new(ConnectionHandle::new(subject, tx));
    let connection_id = handle.id;

    let (mut ws_sender, mut ws_receiver) = socket.split();

    if let Err(e) = register_connection(&state, &handle).await {
        tracing::warn!(connection_id = %connection_id, error = %e, "Connection rejected");
        let _ = send_message(&mut ws_sender, &ServerMessage::from(&e)).await;
        let _ = ws_sender.close().await;
        return;
    }

    // Task for sending messages from channel to WebSocket. On eviction it
    // flushes whatever is already queued, then closes the socket.
    let eviction = handle.eviction_signal();
    let mut send_task = tokio::spawn(async move {
        let evicted = wait_evicted(eviction);
        tokio::pin!(evicted);

        loop {
            tokio::select! {
                maybe_msg = rx.recv() => match maybe_msg {
                    Some(msg) => {
                        if send_message(&mut ws_sender, &msg).await.is_err() {
                            return;
                        }
                    }
                    None => break,
                },
                _ = &mut evicted => {
                    while let Ok(msg) = rx.try_recv() {
                        if send_message(&mut ws_sender, &msg).await.is_err() {
                            return;
                        }
                    }
                    break;
                }
            }
        }

        let _ = ws_sender.close().await;
    });

    // Task for receiving messages from WebSocket
    let state_clone = state.clone();
    let handle_clone = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &state_clone, &handle_clone).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
            send_task.abort();
        }
    }

    // No-op when the session was already removed by a sweep or drain
    state.hub.disconnect(connection_id).await;

    let duration = connection_start.elapsed();
    ConnectionMetrics::record_closed(duration);

    tracing::info!(
        connection_id = %connection_id,
        duration_secs = duration.as_secs_f64(),
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket message
/// Returns false if the connection should be closed
async fn process_message(msg: Message, state: &AppState, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            handle.update_activity();

            let client_msg: ClientMessage = match serde_json::from_str(&text) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(connection_id = %handle.id, error = %e, "Failed to parse client message");
                    WsMessageMetrics::record_invalid();
                    let _ = handle
                        .send(ServerMessage::error("INVALID_MESSAGE", e.to_string()))
                        .await;
                    return true;
                }
            };

            handle_client_message(client_msg, state, handle).await;
            true
        }
        Message::Binary(_) => {
            handle.update_activity();
            let _ = handle
                .send(ServerMessage::error(
                    "UNSUPPORTED_FORMAT",
                    "Binary messages are not supported",
                ))
                .await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            // Axum answers pings itself. Pongs reply to the heartbeat Ping.
            handle.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}

/// Handle a parsed client message
#[tracing::instrument(
    name = "ws.message",
    skip(msg, state, handle),
    fields(
        connection_id = %handle.id,
        message_type = msg.name()
    )
)]
async fn handle_client_message(
    msg: ClientMessage,
    state: &AppState,
    handle: &Arc<ConnectionHandle>,
) {
    WsMessageMetrics::record(msg.name());

    let result = match msg {
        ClientMessage::JoinMatchmaking { user_id, username } => state
            .hub
            .request_match(handle.id, UserInfo::new(user_id, username))
            .await
            .map(|_| ()),
        ClientMessage::CancelMatchmaking => state.hub.cancel_match(handle.id).await.map(|_| ()),
        ClientMessage::Ping => {
            let _ = handle.send(ServerMessage::Pong).await;
            Ok(())
        }
        signal => match signal.into_signal() {
            Some((kind, to, payload)) => state.hub.relay(handle.id, to, kind, payload).await,
            None => Ok(()),
        },
    };

    if let Err(e) = result {
        tracing::debug!(connection_id = %handle.id, code = e.code(), error = %e, "Request failed");
        let _ = handle.send(ServerMessage::from(&e)).await;
    }
}
