//! Encrypted envelope: the only structure the relay ever sees.
//!
//! ```text
//! Envelope
//! ├── ciphertext       AES-256-GCM output (payload ‖ tag)
//! ├── iv               96-bit nonce, fresh per encryption
//! ├── sessionId        selects the symmetric key on the receiving side
//! ├── ephemeralPublicKey?  ┐ present together, only on the first
//! ├── headerBytes?         ┘ message of a session (SignedHeader CBOR)
//! ├── signature        sender's Ed25519 signature over the transcript
//! └── sequenceNumber   strictly increasing per (sender, recipient)
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    codec::{from_cbor, to_cbor},
    errors::{ProtocolError, Result},
    ids::SessionId,
};

/// Domain label mixed into every envelope transcript.
const TRANSCRIPT_DOMAIN: &str = "cipherlink/envelope/v1";

/// Encrypted envelope as transmitted through the delivery channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// AEAD ciphertext including the authentication tag
    pub ciphertext: Vec<u8>,

    /// AEAD nonce
    pub iv: Vec<u8>,

    /// Session whose key protects this envelope
    pub session_id: SessionId,

    /// Initiator's ephemeral public key (first message only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_public_key: Option<Vec<u8>>,

    /// Encoded [`crate::SignedHeader`] (first message only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_bytes: Option<Vec<u8>>,

    /// Sender's signature over [`Envelope::signing_transcript`]
    pub signature: Vec<u8>,

    /// Per-(sender, recipient) sequence number, starting at 1
    pub sequence_number: u64,
}

/// Everything in the envelope except the signature, in a fixed order.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Transcript<'a> {
    domain: &'static str,
    session_id: &'a str,
    sequence_number: u64,
    iv: &'a [u8],
    ciphertext: &'a [u8],
    ephemeral_public_key: Option<&'a [u8]>,
    header_bytes: Option<&'a [u8]>,
}

impl Envelope {
    /// Upper bound on an encoded envelope (16 MiB).
    pub const MAX_SIZE: usize = 16 * 1024 * 1024;

    /// True if this envelope also carries exchange-initiation material.
    pub fn is_initiation(&self) -> bool {
        self.ephemeral_public_key.is_some() && self.header_bytes.is_some()
    }

    /// Bytes covered by the envelope signature.
    ///
    /// Domain-separated CBOR of every field except `signature`. Any change to
    /// ciphertext, IV, session, sequence number or initiation material changes
    /// the transcript.
    pub fn signing_transcript(&self) -> Result<Vec<u8>> {
        to_cbor(&Transcript {
            domain: TRANSCRIPT_DOMAIN,
            session_id: self.session_id.as_str(),
            sequence_number: self.sequence_number,
            iv: &self.iv,
            ciphertext: &self.ciphertext,
            ephemeral_public_key: self.ephemeral_public_key.as_deref(),
            header_bytes: self.header_bytes.as_deref(),
        })
    }

    /// Encode for transmission.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let bytes = to_cbor(self)?;
        if bytes.len() > Self::MAX_SIZE {
            return Err(ProtocolError::EnvelopeTooLarge { size: bytes.len(), max: Self::MAX_SIZE });
        }
        Ok(bytes)
    }

    /// Decode and structurally validate an envelope.
    ///
    /// Rejects oversized input before parsing, and envelopes that carry only
    /// one of the two initiation fields.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > Self::MAX_SIZE {
            return Err(ProtocolError::EnvelopeTooLarge { size: bytes.len(), max: Self::MAX_SIZE });
        }

        let envelope: Self = from_cbor(bytes).map_err(ProtocolError::MalformedEnvelope)?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Check field consistency.
    pub fn validate(&self) -> Result<()> {
        if self.ephemeral_public_key.is_some() != self.header_bytes.is_some() {
            return Err(ProtocolError::MalformedEnvelope(
                "ephemeralPublicKey and headerBytes must be present together".to_string(),
            ));
        }
        if self.sequence_number == 0 {
            return Err(ProtocolError::MalformedEnvelope(
                "sequence numbers start at 1".to_string(),
            ));
        }
        Ok(())
    }
}
