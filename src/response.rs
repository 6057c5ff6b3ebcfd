//! JSON error response helpers.
//!
//! Every failure leaving a handler goes through one of these, so the wire
//! shape is always `{"error": "..."}`.

use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

fn with_status(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

pub fn unauthorized(message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    with_status(StatusCode::UNAUTHORIZED, message)
}

pub fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    with_status(StatusCode::BAD_REQUEST, message)
}

/// Content-policy violations get a 422 rather than a success envelope.
pub fn policy_violation(message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    with_status(StatusCode::UNPROCESSABLE_ENTITY, message)
}

pub fn bad_gateway(message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    with_status(StatusCode::BAD_GATEWAY, message)
}

pub fn internal_error(message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    with_status(StatusCode::INTERNAL_SERVER_ERROR, message)
}
