//! Error types returned by the HTTP handlers.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gym_tracker_client::UpstreamError;
use serde_json::json;
use thiserror::Error;

/// Handler errors. Upstream details are logged, never sent to the caller.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("LLM error: {0}")]
    Llm(#[source] UpstreamError),

    #[error("store error: {0}")]
    Store(#[source] UpstreamError),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("persistence error: {0}")]
    Persistence(#[source] UpstreamError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Missing credentials are a server misconfiguration, everything else an upstream fault.
    pub fn from_llm(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Config(msg) => ApiError::Config(msg),
            other => ApiError::Llm(other),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Llm(_) | ApiError::Store(_) | ApiError::Parse(_) => StatusCode::BAD_GATEWAY,
            ApiError::Persistence(_) => StatusCode::BAD_GATEWAY,
            ApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::Validation(_) => "validation",
            ApiError::Llm(_) | ApiError::Store(_) => "upstream",
            ApiError::Parse(_) => "parse",
            ApiError::Persistence(_) => "persistence",
            ApiError::Config(_) => "config",
        }
    }

    /// Text safe to show to clients.
    pub fn detail(&self) -> String {
        match self {
            ApiError::Unauthorized => "Unauthorized".to_string(),
            ApiError::Validation(msg) | ApiError::Parse(msg) | ApiError::Config(msg) => {
                msg.clone()
            }
            ApiError::Llm(_) => "LLM service error".to_string(),
            ApiError::Store(_) | ApiError::Persistence(_) => {
                "Database persistence error".to_string()
            }
        }
    }
}

impl From<crate::auth::AuthError> for ApiError {
    fn from(_: crate::auth::AuthError) -> Self {
        ApiError::Unauthorized
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        }
        let body = json!({"error": self.kind(), "detail": self.detail()});
        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers.
pub type ApiResult<T> = Result<T, ApiError>;
