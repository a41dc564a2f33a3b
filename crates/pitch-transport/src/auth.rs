//! Bearer token authentication for the authority's HTTP surface.
//!
//! A request is authenticated in two steps. The `Authorization` header must
//! be present and of the form `Bearer <token>` (otherwise 401), and the token
//! must be in the registry (otherwise 403). Both checks run before any queue
//! is consulted.

use crate::queue::MessageQueues;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use common::types::ClientToken;
use thiserror::Error;

/// Scheme prefix of the `Authorization` header.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Authentication failure. Surfaced to the peer as an HTTP status and never
/// retried by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingHeader,

    #[error("Invalid Authorization header format")]
    MalformedHeader,

    #[error("Client token is not registered")]
    UnknownToken,
}

impl AuthError {
    /// HTTP status code reported to the peer.
    #[must_use]
    pub const fn status_code(self) -> u16 {
        match self {
            AuthError::MissingHeader | AuthError::MalformedHeader => 401,
            AuthError::UnknownToken => 403,
        }
    }

    /// Bounded label for metrics.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            AuthError::MissingHeader => "missing_header",
            AuthError::MalformedHeader => "malformed_header",
            AuthError::UnknownToken => "unknown_token",
        }
    }
}

/// Extract the bearer token from the `Authorization` header.
///
/// # Errors
///
/// Returns [`AuthError::MissingHeader`] if the header is absent and
/// [`AuthError::MalformedHeader`] if it is not valid `Bearer <token>`.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    let token = value
        .strip_prefix(BEARER_PREFIX)
        .ok_or(AuthError::MalformedHeader)?
        .trim();

    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AuthError::MalformedHeader);
    }
    Ok(token)
}

/// Authenticate a request against the token registry.
///
/// # Errors
///
/// See [`extract_bearer_token`]; additionally [`AuthError::UnknownToken`] if
/// the token is well-formed but not registered.
pub fn authenticate(headers: &HeaderMap, queues: &MessageQueues) -> Result<ClientToken, AuthError> {
    let token = extract_bearer_token(headers)?;
    queues
        .registered(token)
        .cloned()
        .ok_or(AuthError::UnknownToken)
}
