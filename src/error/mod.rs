use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::matchmaking::SignalingError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SignalingError> for AppError {
    fn from(err: SignalingError) -> Self {
        match err {
            SignalingError::ShuttingDown => AppError::Unavailable(err.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, client_message, log_message) = match &self {
            AppError::Auth(msg) => ("UNAUTHORIZED", msg.clone(), msg.clone()),
            AppError::Unavailable(msg) => ("SHUTTING_DOWN", msg.clone(), msg.clone()),
            AppError::Internal(e) => {
                let log_msg = e.clone();
                let client_msg = if is_production() {
                    "Internal server error".to_string()
                } else {
                    log_msg.clone()
                };
                ("INTERNAL_ERROR", client_msg, log_msg)
            }
        };

        if status.is_server_error() {
            tracing::error!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API error"
            );
        } else {
            tracing::warn!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "Request rejected"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}
