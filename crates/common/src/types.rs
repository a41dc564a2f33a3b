//! Common data types for Pitchlink components.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Bearer token identifying one registered client.
///
/// Used as the key of every per-client record on the authority (message
/// queues, cached commands, the token registry). The value is a credential,
/// so `Debug` never prints it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientToken(String);

impl ClientToken {
    /// Wrap a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token value, for header construction and registry lookups.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the token is empty (never a valid registry entry).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ClientToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClientToken([REDACTED])")
    }
}

impl From<&str> for ClientToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ClientToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for ClientToken {
    fn borrow(&self) -> &str {
        &self.0
    }
}
