//! Public key directory record.

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Directory answer for `identity(remotePartyId)`.
///
/// Keys are hex-encoded raw public keys. The fingerprint is whatever the
/// directory published; comparing it against a locally computed one is the
/// caller's business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    /// Ed25519 verifying key, hex
    pub signing_public_key: String,

    /// X25519 public key, hex
    pub agreement_public_key: String,

    /// Published fingerprint, hex
    pub fingerprint: String,
}

impl IdentityRecord {
    /// Raw signing key bytes.
    pub fn signing_key_bytes(&self) -> Result<Vec<u8>> {
        decode_field("signingPublicKey", &self.signing_public_key)
    }

    /// Raw agreement key bytes.
    pub fn agreement_key_bytes(&self) -> Result<Vec<u8>> {
        decode_field("agreementPublicKey", &self.agreement_public_key)
    }
}

fn decode_field(field: &'static str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value).map_err(|e| ProtocolError::InvalidHex { field, reason: e.to_string() })
}
