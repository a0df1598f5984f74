//! Crypto error types.

/// Errors from key handling, derivation and message protection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// Public key bytes are the wrong length or not a valid point
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// Key agreement or key derivation failed
    #[error("key agreement failed: {0}")]
    KeyAgreement(String),

    /// Signature did not verify under the claimed signer's key
    #[error("invalid signature")]
    InvalidSignature,

    /// AEAD tag mismatch: tampered ciphertext or wrong key
    #[error("authentication failed")]
    AuthenticationFailed,

    /// IV has the wrong length
    #[error("invalid iv length: expected {expected}, got {actual}")]
    InvalidIv {
        /// Required IV length
        expected: usize,
        /// Length received
        actual: usize,
    },

    /// Embedded timestamp is older than the allowed window
    #[error("message too old ({age_ms} ms > {max_age_ms} ms), possible replay")]
    StaleMessage {
        /// How old the message is
        age_ms: u64,
        /// Allowed maximum
        max_age_ms: u64,
    },

    /// Embedded timestamp is further in the future than the skew allowance
    #[error(
        "message from the future ({ahead_ms} ms > {max_skew_ms} ms), possible replay or clock \
         manipulation"
    )]
    FutureTimestamp {
        /// How far ahead of our clock the message claims to be
        ahead_ms: u64,
        /// Allowed clock skew
        max_skew_ms: u64,
    },

    /// Decrypted plaintext has an unknown or truncated format
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Untimestamped payload while legacy payloads are disabled
    #[error("legacy payload rejected")]
    LegacyPayloadRejected,

    /// AEAD encryption failed (never expected with valid inputs)
    #[error("encryption failed")]
    EncryptionFailed,
}
