//! Message handler traits.

use async_trait::async_trait;
use common::types::ClientToken;
use pitch_protocol::Message;
use thiserror::Error;

/// Failure reported by a message handler.
///
/// Handler failures never abort dispatch: the transport logs them and moves
/// on to the next handler and the next message.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler understood the message but refused to act on it.
    #[error("Message rejected: {0}")]
    Rejected(String),

    /// The handler failed while acting on the message.
    #[error("Message handling failed: {0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Wrap any error as a handling failure.
    pub fn failed(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        HandlerError::Failed(Box::new(err))
    }
}

/// Authority-side handler, invoked for every message a peer pushes.
///
/// A handler may return a reply; the transport enqueues it for the peer that
/// sent the message, so replies reach the requester only.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(
        &self,
        token: &ClientToken,
        message: &Message,
    ) -> Result<Option<Message>, HandlerError>;
}

/// Peer-side handler, invoked for every message the polling loop receives.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError>;
}
