// Anthropic-compatible error response formatting.
// All error bodies follow: {"type": "error", "error": {"type": "<type>", "message": "<msg>"}}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Anthropic API error types this proxy can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnthropicErrorType {
    InvalidRequestError,
    AuthenticationError,
    ApiError,
}

impl AnthropicErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequestError => "invalid_request_error",
            Self::AuthenticationError => "authentication_error",
            Self::ApiError => "api_error",
        }
    }
}

/// Build an Anthropic-format error response with the given HTTP status,
/// error type, and message.
pub fn error_response(
    status: StatusCode,
    error_type: AnthropicErrorType,
    message: &str,
) -> Response {
    let body = json!({
        "type": "error",
        "error": {
            "type": error_type.as_str(),
            "message": message
        }
    });
    (status, Json(body)).into_response()
}
