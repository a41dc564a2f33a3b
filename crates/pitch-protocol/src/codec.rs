//! Wire codec for messages.
//!
//! Two body encodings are supported. The authority and its peers must agree
//! on one per deployment; the format is never negotiated.
//!
//! - [`WireFormat::Bson`] (default): the message document as a BSON byte
//!   string. Binary fields (camera frames) are carried natively.
//! - [`WireFormat::Json`]: canonical extended JSON on output, so binary
//!   fields survive as `$binary` objects and every number keeps its BSON
//!   type. Relaxed extended JSON and plain JSON are accepted on input.

use crate::error::ProtocolError;
use crate::message::Message;
use bson::Document;
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

/// Message body encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// Compact binary document encoding.
    #[default]
    Bson,
    /// Extended JSON.
    Json,
}

impl WireFormat {
    /// `Content-Type` used for bodies in this format.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            WireFormat::Bson => "application/bson",
            WireFormat::Json => "application/json",
        }
    }

    /// Encode a message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::BsonEncode`] or [`ProtocolError::Json`] if the
    /// document cannot be written.
    pub fn encode(self, message: &Message) -> Result<Bytes, ProtocolError> {
        match self {
            WireFormat::Bson => {
                let mut buf = Vec::new();
                message.document().to_writer(&mut buf)?;
                Ok(Bytes::from(buf))
            }
            WireFormat::Json => Ok(Bytes::from(serde_json::to_vec(
                &message.to_canonical_json(),
            )?)),
        }
    }

    /// Decode and validate a message.
    ///
    /// # Errors
    ///
    /// Returns a decode error for malformed bytes and
    /// [`ProtocolError::Validation`] if the envelope is invalid.
    pub fn decode(self, bytes: &[u8]) -> Result<Message, ProtocolError> {
        match self {
            WireFormat::Bson => {
                let document = Document::from_reader(bytes)?;
                Ok(Message::from_document(document)?)
            }
            WireFormat::Json => {
                let value: serde_json::Value = serde_json::from_slice(bytes)?;
                Message::from_json(value)
            }
        }
    }
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bson" => Ok(WireFormat::Bson),
            "json" => Ok(WireFormat::Json),
            other => Err(format!("unknown wire format '{other}', expected 'bson' or 'json'")),
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireFormat::Bson => f.write_str("bson"),
            WireFormat::Json => f.write_str("json"),
        }
    }
}

/// Encode a message as BSON.
///
/// # Errors
///
/// See [`WireFormat::encode`].
pub fn encode(message: &Message) -> Result<Bytes, ProtocolError> {
    WireFormat::Bson.encode(message)
}

/// Decode a BSON message.
///
/// # Errors
///
/// See [`WireFormat::decode`].
pub fn decode(bytes: &[u8]) -> Result<Message, ProtocolError> {
    WireFormat::Bson.decode(bytes)
}
