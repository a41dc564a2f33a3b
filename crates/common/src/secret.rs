//! Secret types for protecting bearer tokens from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. A peer holds its
//! own bearer token as a [`SecretString`] for the lifetime of a session and
//! only exposes it when building the `Authorization` header.
//!
//! # Example
//!
//! ```rust
//! use common::secret::SecretString;
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct PeerCredentials {
//!     team: String,
//!     token: SecretString,  // Safe: Debug shows "[REDACTED]"
//! }
//!
//! let creds = PeerCredentials {
//!     team: "red".to_string(),
//!     token: SecretString::from("red-robot-1"),
//! };
//!
//! // Token is redacted
//! println!("{:?}", creds);
//!
//! let header = format!("Bearer {}", creds.token.expose_secret());
//! # assert_eq!(header, "Bearer red-robot-1");
//! ```
//!
//! Tokens held by the authority are registry keys and use
//! [`crate::types::ClientToken`] instead, which can be hashed.

pub use secrecy::{ExposeSecret, SecretString};
