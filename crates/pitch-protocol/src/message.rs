//! Message envelope.
//!
//! A message is a document with two envelope fields:
//!
//! | Field      | Type   | Values                                   |
//! |------------|--------|------------------------------------------|
//! | `type`     | string | open vocabulary, see [`MessageKind`]     |
//! | `bound_to` | string | `client` or `server`, see [`BoundTo`]    |
//!
//! All other fields are type-specific. Construction always validates the
//! envelope, so an existing [`Message`] is valid by construction.

use crate::error::{ProtocolError, ValidationError};
use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Envelope field holding the message type.
pub const TYPE_FIELD: &str = "type";

/// Envelope field holding the message direction.
pub const BOUND_TO_FIELD: &str = "bound_to";

/// Direction of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundTo {
    /// Travels from the authority to a peer.
    Client,
    /// Travels from a peer to the authority.
    Server,
}

impl BoundTo {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            BoundTo::Client => "client",
            BoundTo::Server => "server",
        }
    }
}

impl FromStr for BoundTo {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(BoundTo::Client),
            "server" => Ok(BoundTo::Server),
            other => Err(ValidationError::InvalidBoundTo(other.to_string())),
        }
    }
}

impl fmt::Display for BoundTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message type tag.
///
/// The vocabulary is open: tags the authority does not define are kept as
/// [`MessageKind::Other`] so the transport can carry them and domain code can
/// ignore them explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Request for (or reply carrying) the current game information.
    GetGameInfo,
    /// Request for (or reply carrying) the requester's team name.
    GetTeamInfo,
    /// Robot sensor telemetry pushed to a peer.
    PushRobotStatus,
    /// Actuator command pushed to the authority.
    PushRobotControl,
    /// Camera frame pushed to a peer.
    PushCapturedImage,
    /// Any tag outside the known vocabulary.
    Other(String),
}

impl MessageKind {
    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::GetGameInfo => "get_game_info",
            MessageKind::GetTeamInfo => "get_team_info",
            MessageKind::PushRobotStatus => "push_robot_status",
            MessageKind::PushRobotControl => "push_robot_control",
            MessageKind::PushCapturedImage => "push_captured_image",
            MessageKind::Other(tag) => tag,
        }
    }

    /// Whether the tag belongs to the known vocabulary.
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, MessageKind::Other(_))
    }
}

impl From<&str> for MessageKind {
    fn from(tag: &str) -> Self {
        match tag {
            "get_game_info" => MessageKind::GetGameInfo,
            "get_team_info" => MessageKind::GetTeamInfo,
            "push_robot_status" => MessageKind::PushRobotStatus,
            "push_robot_control" => MessageKind::PushRobotControl,
            "push_captured_image" => MessageKind::PushCapturedImage,
            other => MessageKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    kind: MessageKind,
    bound_to: BoundTo,
    document: Document,
}

impl Message {
    /// Create a message with only the envelope fields set.
    #[must_use]
    pub fn new(kind: MessageKind, bound_to: BoundTo) -> Self {
        let mut document = Document::new();
        document.insert(TYPE_FIELD, kind.as_str());
        document.insert(BOUND_TO_FIELD, bound_to.as_str());
        Self {
            kind,
            bound_to,
            document,
        }
    }

    /// Create a message travelling from a peer to the authority.
    #[must_use]
    pub fn to_server(kind: MessageKind) -> Self {
        Self::new(kind, BoundTo::Server)
    }

    /// Create a message travelling from the authority to a peer.
    #[must_use]
    pub fn to_client(kind: MessageKind) -> Self {
        Self::new(kind, BoundTo::Client)
    }

    /// Set a type-specific field.
    ///
    /// Envelope fields cannot be overwritten this way; `type` and `bound_to`
    /// keys are ignored.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: impl Into<Bson>) -> Self {
        if !is_envelope_field(key) {
            self.document.insert(key, value.into());
        }
        self
    }

    /// Merge every non-envelope field of `fields` into the message.
    #[must_use]
    pub fn with_fields(mut self, fields: Document) -> Self {
        for (key, value) in fields {
            if !is_envelope_field(&key) {
                self.document.insert(key, value);
            }
        }
        self
    }

    /// Build a message from a document, validating the envelope.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if `type` or `bound_to` is missing,
    /// not a string, or `bound_to` is not `client`/`server`.
    pub fn from_document(document: Document) -> Result<Self, ValidationError> {
        let kind = match document.get(TYPE_FIELD) {
            None => return Err(ValidationError::MissingField(TYPE_FIELD)),
            Some(Bson::String(tag)) => MessageKind::from(tag.as_str()),
            Some(_) => {
                return Err(ValidationError::InvalidFieldType {
                    field: TYPE_FIELD,
                    expected: "string",
                })
            }
        };

        let bound_to = match document.get(BOUND_TO_FIELD) {
            None => return Err(ValidationError::MissingField(BOUND_TO_FIELD)),
            Some(Bson::String(direction)) => direction.parse()?,
            Some(_) => {
                return Err(ValidationError::InvalidFieldType {
                    field: BOUND_TO_FIELD,
                    expected: "string",
                })
            }
        };

        Ok(Self {
            kind,
            bound_to,
            document,
        })
    }

    /// Build a message from a JSON value (canonical or relaxed extended JSON).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotADocument`] for non-object values,
    /// [`ProtocolError::ExtendedJson`] for malformed extended JSON and
    /// [`ProtocolError::Validation`] for envelope violations.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ProtocolError> {
        if !value.is_object() {
            return Err(ProtocolError::NotADocument);
        }
        match Bson::try_from(value) {
            Ok(Bson::Document(document)) => Ok(Self::from_document(document)?),
            Ok(_) => Err(ProtocolError::NotADocument),
            Err(e) => Err(ProtocolError::ExtendedJson(e.to_string())),
        }
    }

    /// Message type.
    #[must_use]
    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// Message direction.
    #[must_use]
    pub fn bound_to(&self) -> BoundTo {
        self.bound_to
    }

    /// Look up any field, envelope fields included.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.document.get(key)
    }

    /// Full document, envelope fields included.
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Consume the message, returning the full document.
    #[must_use]
    pub fn into_document(self) -> Document {
        self.document
    }

    /// Relaxed extended JSON view of the message. Lossy for integer
    /// widths; see [`Message::to_canonical_json`].
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        Bson::Document(self.document.clone()).into_relaxed_extjson()
    }

    /// Canonical extended JSON view of the message. Every value keeps its
    /// BSON type through [`Message::from_json`].
    #[must_use]
    pub fn to_canonical_json(&self) -> serde_json::Value {
        Bson::Document(self.document.clone()).into_canonical_extjson()
    }

    /// Check the message carries `expected` as its type.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnexpectedKind`] on mismatch.
    pub fn expect_kind(&self, expected: &MessageKind) -> Result<(), ProtocolError> {
        if &self.kind == expected {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedKind {
                expected: expected.to_string(),
                actual: self.kind.to_string(),
            })
        }
    }
}

impl TryFrom<Document> for Message {
    type Error = ValidationError;

    fn try_from(document: Document) -> Result<Self, Self::Error> {
        Self::from_document(document)
    }
}

impl From<Message> for Document {
    fn from(message: Message) -> Self {
        message.document
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (bound to {})", self.kind, self.bound_to)
    }
}

fn is_envelope_field(key: &str) -> bool {
    key == TYPE_FIELD || key == BOUND_TO_FIELD
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_new_sets_envelope_fields() {
        let message = Message::to_server(MessageKind::GetGameInfo);

        assert_eq!(message.kind(), &MessageKind::GetGameInfo);
        assert_eq!(message.bound_to(), BoundTo::Server);
        assert_eq!(
            message.document(),
            &doc! { "type": "get_game_info", "bound_to": "server" }
        );
    }

    #[test]
    fn test_from_document_accepts_valid_envelope() {
        let message = Message::from_document(doc! {
            "type": "push_robot_status",
            "bound_to": "client",
            "team": "red",
        })
        .expect("valid envelope");

        assert_eq!(message.kind(), &MessageKind::PushRobotStatus);
        assert_eq!(message.bound_to(), BoundTo::Client);
        assert_eq!(message.get("team"), Some(&Bson::String("red".to_string())));
    }

    #[test]
    fn test_from_document_rejects_missing_type() {
        let result = Message::from_document(doc! { "bound_to": "server" });
        assert_eq!(result, Err(ValidationError::MissingField("type")));
    }

    #[test]
    fn test_from_document_rejects_missing_bound_to() {
        let result = Message::from_document(doc! { "type": "get_game_info" });
        assert_eq!(result, Err(ValidationError::MissingField("bound_to")));
    }

    #[test]
    fn test_from_document_rejects_unknown_direction() {
        let result = Message::from_document(doc! {
            "type": "get_game_info",
            "bound_to": "referee",
        });
        assert_eq!(
            result,
            Err(ValidationError::InvalidBoundTo("referee".to_string()))
        );
    }

    #[test]
    fn test_from_document_rejects_non_string_type() {
        let result = Message::from_document(doc! { "type": 7, "bound_to": "server" });
        assert_eq!(
            result,
            Err(ValidationError::InvalidFieldType {
                field: "type",
                expected: "string"
            })
        );
    }

    #[test]
    fn test_unknown_type_is_kept() {
        let message = Message::from_document(doc! {
            "type": "start_streaming",
            "bound_to": "server",
        })
        .expect("open vocabulary");

        assert_eq!(
            message.kind(),
            &MessageKind::Other("start_streaming".to_string())
        );
        assert!(!message.kind().is_known());
    }

    #[test]
    fn test_with_field_does_not_override_envelope() {
        let message = Message::to_client(MessageKind::GetTeamInfo)
            .with_field("team", "blue")
            .with_field("bound_to", "server")
            .with_field("type", "something_else");

        assert_eq!(message.bound_to(), BoundTo::Client);
        assert_eq!(message.kind(), &MessageKind::GetTeamInfo);
        assert_eq!(
            message.get("bound_to"),
            Some(&Bson::String("client".to_string()))
        );
        assert_eq!(message.get("team"), Some(&Bson::String("blue".to_string())));
    }

    #[test]
    fn test_from_json_object() {
        let message = Message::from_json(serde_json::json!({
            "type": "get_game_info",
            "bound_to": "server",
        }))
        .expect("valid json envelope");

        assert_eq!(message.kind(), &MessageKind::GetGameInfo);
    }

    #[test]
    fn test_from_json_rejects_array() {
        let result = Message::from_json(serde_json::json!([1, 2, 3]));
        assert!(matches!(result, Err(ProtocolError::NotADocument)));
    }

    #[test]
    fn test_expect_kind_mismatch() {
        let message = Message::to_server(MessageKind::GetGameInfo);
        let result = message.expect_kind(&MessageKind::PushRobotControl);

        assert!(matches!(
            result,
            Err(ProtocolError::UnexpectedKind { expected, actual })
                if expected == "push_robot_control" && actual == "get_game_info"
        ));
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in [
            MessageKind::GetGameInfo,
            MessageKind::GetTeamInfo,
            MessageKind::PushRobotStatus,
            MessageKind::PushRobotControl,
            MessageKind::PushCapturedImage,
        ] {
            assert_eq!(MessageKind::from(kind.as_str()), kind);
        }
    }
}
