//! Identity fingerprints for out-of-band verification.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::keys::PublicIdentity;

const FINGERPRINT_DOMAIN: &[u8] = b"cipherlink/fingerprint/v1";

/// SHA-256 over both public keys, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of an identity.
    pub fn of(identity: &PublicIdentity) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_DOMAIN);
        hasher.update(identity.signing.to_bytes());
        hasher.update(identity.agreement.to_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a fingerprint read out by a human.
    ///
    /// Case, whitespace and `:` separators are ignored.
    pub fn matches(&self, presented: &str) -> bool {
        let normalized: String = presented
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        normalized == self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
