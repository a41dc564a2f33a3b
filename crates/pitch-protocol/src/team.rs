//! Team membership reply.

use crate::error::ProtocolError;
use crate::message::{Message, MessageKind};
use serde::{Deserialize, Serialize};

/// The team a peer's token is registered to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamInfo {
    pub team: String,
}

impl TeamInfo {
    #[must_use]
    pub fn new(team: impl Into<String>) -> Self {
        Self { team: team.into() }
    }

    /// Serialize as a `get_team_info` reply bound to a client.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::BsonEncode`] if the fields cannot be encoded.
    pub fn to_message(&self) -> Result<Message, ProtocolError> {
        let fields = bson::to_document(self)?;
        Ok(Message::to_client(MessageKind::GetTeamInfo).with_fields(fields))
    }

    /// Read the team out of a `get_team_info` reply.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnexpectedKind`] for other message types and
    /// [`ProtocolError::InvalidPayload`] if `team` is missing or not a string.
    pub fn from_message(message: &Message) -> Result<Self, ProtocolError> {
        message.expect_kind(&MessageKind::GetTeamInfo)?;
        bson::from_document(message.document().clone())
            .map_err(|e| ProtocolError::payload(MessageKind::GetTeamInfo.as_str(), e))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::message::BoundTo;

    #[test]
    fn test_reply_layout() {
        let message = TeamInfo::new("blue").to_message().unwrap();

        assert_eq!(message.kind(), &MessageKind::GetTeamInfo);
        assert_eq!(message.bound_to(), BoundTo::Client);
        assert_eq!(message.document().get_str("team").unwrap(), "blue");
        assert_eq!(TeamInfo::from_message(&message).unwrap(), TeamInfo::new("blue"));
    }

    #[test]
    fn test_request_has_no_team() {
        let request = Message::to_server(MessageKind::GetTeamInfo);
        assert!(matches!(
            TeamInfo::from_message(&request),
            Err(ProtocolError::InvalidPayload { .. })
        ));
    }
}
