//! Exchange header and its signed container.
//!
//! The header is the key-exchange material the initiator commits to. It is
//! serialized once, signed over those exact bytes, and the bytes (not a
//! re-serialization) travel to the responder.

use serde::{Deserialize, Serialize};

use crate::{
    codec::{from_cbor, to_cbor},
    errors::{ProtocolError, Result},
    ids::{CONTEXT_SEPARATOR, PartyId, SessionId},
};

/// Build the key-derivation context for an exchange.
///
/// Format: `initiator || "||" || responder || "||" || timestamp_ms`. Binds
/// both parties and the initiation time so a key derived for one logical
/// session is never valid for another.
pub fn exchange_context(initiator: &PartyId, responder: &PartyId, timestamp_ms: u64) -> String {
    format!(
        "{initiator}{sep}{responder}{sep}{timestamp_ms}",
        sep = CONTEXT_SEPARATOR
    )
}

/// Key-exchange header
///
/// # Protocol Flow
///
/// 1. Initiator generates an ephemeral key pair and a random session id
/// 2. Initiator builds the context string and derives the session key
/// 3. Initiator serializes this header and signs the bytes
/// 4. Responder verifies the signature, then derives the same key from the
///    `context` carried here (never a locally recomputed one)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeHeader {
    /// Initiator's ephemeral X25519 public key
    pub ephemeral_public_key: Vec<u8>,

    /// Session this exchange establishes
    pub session_id: SessionId,

    /// Initiator's wall clock at initiation, milliseconds since the epoch
    pub timestamp_ms: u64,

    /// Key-derivation context (see [`exchange_context`])
    pub context: String,
}

impl ExchangeHeader {
    /// Deterministic CBOR encoding. These are the bytes that get signed.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        to_cbor(self)
    }

    /// Parse header bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        from_cbor(bytes).map_err(ProtocolError::MalformedHeader)
    }

    /// Split the context back into `(initiator, responder, timestamp_ms)`.
    ///
    /// Returns `None` if the context does not have the expected shape.
    pub fn context_parts(&self) -> Option<(&str, &str, u64)> {
        let mut parts = self.context.split(CONTEXT_SEPARATOR);
        let initiator = parts.next()?;
        let responder = parts.next()?;
        let timestamp = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some((initiator, responder, timestamp))
    }
}

/// Header bytes together with the initiator's signature over them.
///
/// Carried in an envelope's `headerBytes` field on the first message of a
/// session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedHeader {
    /// Exact bytes produced by [`ExchangeHeader::to_bytes`]
    pub header_bytes: Vec<u8>,

    /// Ed25519 signature over `header_bytes`
    pub signature: Vec<u8>,
}

impl SignedHeader {
    /// Encode the container.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        to_cbor(self)
    }

    /// Parse the container. Does not verify the signature.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        from_cbor(bytes).map_err(ProtocolError::MalformedHeader)
    }
}
