//! Plaintext framing inside the AEAD.
//!
//! ```text
//! 0x00 ‖ raw bytes                       legacy, no timestamp
//! 0x01 ‖ CBOR {data, timestampMs}        message
//! 0x02 ‖ u64 BE timestamp_ms ‖ raw bytes  file
//! ```
//!
//! The leading tag is authenticated together with the rest of the plaintext,
//! so a receiver never has to guess the format.

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

/// Tag for untimestamped payloads from older clients.
pub const FORMAT_LEGACY: u8 = 0x00;
/// Tag for structured text/message payloads.
pub const FORMAT_MESSAGE: u8 = 0x01;
/// Tag for file payloads.
pub const FORMAT_FILE: u8 = 0x02;

const FILE_TIMESTAMP_LEN: usize = 8;

/// Decoded plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Raw bytes without a freshness marker
    Legacy(Vec<u8>),

    /// Message body with sender timestamp
    Message {
        /// Application plaintext
        data: Vec<u8>,
        /// Sender clock at encryption, ms since the epoch
        timestamp_ms: u64,
    },

    /// File bytes with sender timestamp
    File {
        /// File contents
        data: Vec<u8>,
        /// Sender clock at encryption, ms since the epoch
        timestamp_ms: u64,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageBodyRef<'a> {
    data: &'a [u8],
    timestamp_ms: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageBody {
    data: Vec<u8>,
    timestamp_ms: u64,
}

impl Payload {
    /// Encode with the leading format tag.
    pub fn encode(&self) -> Result<Vec<u8>, CryptoError> {
        match self {
            Self::Legacy(data) => {
                let mut out = Vec::with_capacity(1 + data.len());
                out.push(FORMAT_LEGACY);
                out.extend_from_slice(data);
                Ok(out)
            },
            Self::Message { data, timestamp_ms } => {
                let mut out = vec![FORMAT_MESSAGE];
                let body = MessageBodyRef { data, timestamp_ms: *timestamp_ms };
                ciborium::ser::into_writer(&body, &mut out)
                    .map_err(|e| CryptoError::MalformedPayload(e.to_string()))?;
                Ok(out)
            },
            Self::File { data, timestamp_ms } => {
                let mut out = Vec::with_capacity(1 + FILE_TIMESTAMP_LEN + data.len());
                out.push(FORMAT_FILE);
                out.extend_from_slice(&timestamp_ms.to_be_bytes());
                out.extend_from_slice(data);
                Ok(out)
            },
        }
    }

    /// Decode a tagged plaintext.
    pub fn decode(bytes: &[u8]) -> Result<Self, CryptoError> {
        let Some((&tag, body)) = bytes.split_first() else {
            return Err(CryptoError::MalformedPayload("empty payload".to_string()));
        };

        match tag {
            FORMAT_LEGACY => Ok(Self::Legacy(body.to_vec())),
            FORMAT_MESSAGE => {
                let MessageBody { data, timestamp_ms } = ciborium::de::from_reader(body)
                    .map_err(|e| CryptoError::MalformedPayload(e.to_string()))?;
                Ok(Self::Message { data, timestamp_ms })
            },
            FORMAT_FILE => {
                if body.len() < FILE_TIMESTAMP_LEN {
                    return Err(CryptoError::MalformedPayload(
                        "file payload shorter than its timestamp".to_string(),
                    ));
                }
                let (ts, data) = body.split_at(FILE_TIMESTAMP_LEN);
                let mut raw = [0u8; FILE_TIMESTAMP_LEN];
                raw.copy_from_slice(ts);
                Ok(Self::File { data: data.to_vec(), timestamp_ms: u64::from_be_bytes(raw) })
            },
            other => Err(CryptoError::MalformedPayload(format!("unknown format tag {other:#04x}"))),
        }
    }

    /// Sender timestamp, if the format carries one.
    pub fn timestamp_ms(&self) -> Option<u64> {
        match self {
            Self::Legacy(_) => None,
            Self::Message { timestamp_ms, .. } | Self::File { timestamp_ms, .. } => {
                Some(*timestamp_ms)
            },
        }
    }

    /// Plaintext bytes, dropping the framing.
    pub fn into_data(self) -> Vec<u8> {
        match self {
            Self::Legacy(data) | Self::Message { data, .. } | Self::File { data, .. } => data,
        }
    }
}
