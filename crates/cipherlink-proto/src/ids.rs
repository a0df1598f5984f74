//! Party and session identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;

/// Separator between the fields of an exchange context string.
pub(crate) const CONTEXT_SEPARATOR: &str = "||";

/// Identifier of a messaging party (user id as assigned by the server).
///
/// Must be non-empty and must not contain `|`, otherwise two different
/// (initiator, responder) pairs could produce the same context string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartyId(String);

impl PartyId {
    /// Validate and wrap a party identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, ProtocolError> {
        let id = id.into();
        if id.is_empty() || id.contains('|') {
            return Err(ProtocolError::InvalidPartyId(id));
        }
        Ok(Self(id))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PartyId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PartyId> for String {
    fn from(id: PartyId) -> Self {
        id.0
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque 128-bit session identifier, hex-encoded (32 lowercase chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Length of the raw identifier in bytes.
    pub const LEN: usize = 16;

    /// Build an identifier from 16 random bytes.
    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Parse a hex-encoded identifier.
    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        let valid = s.len() == Self::LEN * 2
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(ProtocolError::InvalidSessionId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Borrow the hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
