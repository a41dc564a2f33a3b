//! Transport error types.
//!
//! Errors raised while serving a peer request map to HTTP status codes via
//! the `IntoResponse` impl. Response bodies are generic for server-side
//! failures; the actual error is logged.

use crate::auth::AuthError;
use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use pitch_protocol::ProtocolError;
use serde::Serialize;
use std::net::SocketAddr;
use thiserror::Error;

/// Transport error type.
///
/// Maps to HTTP status codes:
/// - Auth: 401 (missing/malformed header) or 403 (unknown token)
/// - InvalidMessage: 400 Bad Request
/// - everything else: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Invalid message: {0}")]
    InvalidMessage(#[source] ProtocolError),

    #[error("Failed to encode message: {0}")]
    Encode(#[source] ProtocolError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected HTTP status: {0}")]
    UnexpectedStatus(u16),

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            TransportError::Auth(e) => e.status_code(),
            TransportError::InvalidMessage(_) => 400,
            TransportError::Encode(_)
            | TransportError::Network(_)
            | TransportError::UnexpectedStatus(_)
            | TransportError::Bind { .. }
            | TransportError::InvalidUrl(_) => 500,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Network(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            TransportError::Auth(AuthError::UnknownToken) => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                AuthError::UnknownToken.to_string(),
            ),
            TransportError::Auth(e) => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", e.to_string()),
            TransportError::InvalidMessage(e) => {
                (StatusCode::BAD_REQUEST, "INVALID_MESSAGE", e.to_string())
            }
            other => {
                tracing::error!(target: "pitch.transport.server", error = %other, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"pitchlink\", error=\"invalid_token\""),
            );
        }

        response
    }
}
