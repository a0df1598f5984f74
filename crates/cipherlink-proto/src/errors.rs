//! Wire-level errors.

/// Errors raised while encoding or decoding protocol structures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Exchange header (or its signed container) failed to parse
    #[error("malformed exchange header: {0}")]
    MalformedHeader(String),

    /// Envelope failed to parse or has inconsistent optional fields
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Envelope exceeds the decode limit
    #[error("envelope too large: {size} bytes (max {max})")]
    EnvelopeTooLarge {
        /// Size of the rejected input
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Session identifier is not 32 lowercase hex characters
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// Party identifier is empty or contains the context separator
    #[error("invalid party id: {0:?}")]
    InvalidPartyId(String),

    /// Hex field in an identity record failed to decode
    #[error("invalid hex in {field}: {reason}")]
    InvalidHex {
        /// Name of the offending field
        field: &'static str,
        /// Decoder message
        reason: String,
    },

    /// CBOR serialization failed
    #[error("encoding failed: {0}")]
    Encode(String),
}

/// Convenience alias for results in this crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;
