//! Protocol error types.

use thiserror::Error;

/// Envelope schema violations.
///
/// A [`crate::Message`] can only be constructed from a document that carries
/// a string `type` and a `bound_to` of either `client` or `server`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required envelope field is absent.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A required envelope field has the wrong BSON type.
    #[error("Field '{field}' must be a {expected}")]
    InvalidFieldType {
        field: &'static str,
        expected: &'static str,
    },

    /// `bound_to` is not one of the recognized directions.
    #[error("Invalid bound_to value: {0}")]
    InvalidBoundTo(String),
}

/// Errors raised while encoding, decoding or interpreting messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Decoded document failed envelope validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Bytes are not a valid BSON document.
    #[error("BSON decode error: {0}")]
    BsonDecode(#[from] bson::de::Error),

    /// Document could not be written as BSON.
    #[error("BSON encode error: {0}")]
    BsonEncode(#[from] bson::ser::Error),

    /// Bytes are not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON is not valid extended JSON.
    #[error("Extended JSON error: {0}")]
    ExtendedJson(String),

    /// Top-level value is not a document/object.
    #[error("Message body must be a document")]
    NotADocument,

    /// A typed payload could not be read from or written to a message.
    #[error("Invalid {kind} payload: {reason}")]
    InvalidPayload { kind: String, reason: String },

    /// A fixed-size vector field has the wrong number of components.
    #[error("Field '{field}' must have {expected} components, got {actual}")]
    ShapeMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Message type does not match the payload being extracted.
    #[error("Expected message type '{expected}', got '{actual}'")]
    UnexpectedKind { expected: String, actual: String },

    /// Game information violates its invariants.
    #[error("Invalid game info: {0}")]
    InvalidGameInfo(String),
}

impl ProtocolError {
    pub(crate) fn payload(kind: &str, reason: impl ToString) -> Self {
        ProtocolError::InvalidPayload {
            kind: kind.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_missing_field() {
        let error = ValidationError::MissingField("bound_to");
        assert_eq!(format!("{error}"), "Missing required field: bound_to");
    }

    #[test]
    fn test_display_invalid_bound_to() {
        let error = ValidationError::InvalidBoundTo("referee".to_string());
        assert_eq!(format!("{error}"), "Invalid bound_to value: referee");
    }

    #[test]
    fn test_display_shape_mismatch() {
        let error = ProtocolError::ShapeMismatch {
            field: "acceleration",
            expected: 3,
            actual: 2,
        };
        assert_eq!(
            format!("{error}"),
            "Field 'acceleration' must have 3 components, got 2"
        );
    }

    #[test]
    fn test_validation_converts_into_protocol_error() {
        let error: ProtocolError = ValidationError::MissingField("type").into();
        assert!(matches!(
            error,
            ProtocolError::Validation(ValidationError::MissingField("type"))
        ));
    }
}
