//! Domain error types.
//!
//! Errors raised inside Server message handlers never reach the peer: the
//! transport logs them and sends no reply for that request.

use crate::config::ConfigError;
use pitch_protocol::ProtocolError;
use pitch_transport::{HandlerError, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("Game info has not been set")]
    GameInfoUnset,

    #[error("Client is not registered")]
    UnknownClient,

    #[error("Team '{0}' has no score entry")]
    TeamNotInGame(String),

    #[error("Timed out waiting for a reply")]
    Timeout,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<SdkError> for HandlerError {
    fn from(err: SdkError) -> Self {
        match err {
            SdkError::GameInfoUnset
            | SdkError::UnknownClient
            | SdkError::TeamNotInGame(_) => HandlerError::Rejected(err.to_string()),
            SdkError::Timeout
            | SdkError::Protocol(_)
            | SdkError::Transport(_)
            | SdkError::Config(_) => HandlerError::failed(err),
        }
    }
}
