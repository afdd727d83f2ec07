//! Error types for the Tether server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tether_mcp::template::TemplateError;
use tether_mcp::{RegistryError, TaskError};
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Registration error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Invalid resource template: {0}")]
    Template(#[from] TemplateError),

    #[error("Task dispatcher error: {0}")]
    Task(#[from] TaskError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, error_type, suggestion) = match &self {
            ServerError::InvalidRequest(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "Send a single JSON-RPC 2.0 request object",
            ),
            ServerError::Registry(_) | ServerError::Template(_) | ServerError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                "Check the server configuration and registered items",
            ),
            ServerError::Task(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "execution_thread_unavailable",
                "The host's execution thread is not accepting work; retry later",
            ),
            ServerError::Io(_) | ServerError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_server_error",
                "Contact support if this error persists",
            ),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
                "code": status.as_u16(),
                "suggestion": suggestion,
                "timestamp": chrono::Utc::now().timestamp(),
                "request_id": generate_request_id(),
            }
        }));
        (status, body).into_response()
    }
}

/// Generate a unique request ID for error tracking
fn generate_request_id() -> String {
    format!("req_{:x}", chrono::Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let response = ServerError::InvalidRequest("bad".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ServerError::Internal("boom".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = ServerError::Task(TaskError::NotRunning).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
