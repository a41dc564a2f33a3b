//! Message protocol shared by the Pitchlink authority and its peers.
//!
//! Every exchange between a robot controller and the match authority is a
//! [`Message`]: a document carrying a `type` tag, a `bound_to` direction tag
//! and type-specific fields. This crate owns
//!
//! - the envelope and its schema validation ([`message`]),
//! - the binary (BSON) and JSON wire encodings ([`codec`]),
//! - the typed payloads lifted out of messages: [`game::GameInfo`],
//!   [`robot::RobotStatus`], [`robot::RobotControl`],
//!   [`image::CapturedImage`] and [`team::TeamInfo`].
//!
//! Transport crates move opaque messages; only the typed payload modules
//! interpret message fields.

#![warn(clippy::pedantic)]

pub mod codec;
pub mod error;
pub mod game;
pub mod image;
pub mod message;
pub mod robot;
pub mod team;

pub use codec::{decode, encode, WireFormat};
pub use error::{ProtocolError, ValidationError};
pub use message::{BoundTo, Message, MessageKind};
