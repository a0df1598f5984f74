//! Session and storage errors.
//!
//! Verification failures are never retryable and are kept distinct from
//! transient storage failures, so callers can route the former to an audit
//! trail and retry only the latter.

use cipherlink_crypto::CryptoError;
use cipherlink_proto::{PartyId, ProtocolError, SessionId};

use crate::exchange::ExchangeState;

/// Local persistence failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The backing database failed
    #[error("storage backend: {0}")]
    Backend(String),

    /// A stored record could not be decoded
    #[error("corrupt record {key}: {reason}")]
    Corrupt {
        /// Key of the unreadable record
        key: String,
        /// Decoder message
        reason: String,
    },

    /// A different session is already stored under this id
    #[error("session id {0} already bound to a different session")]
    Conflict(SessionId),
}

/// Errors surfaced by exchange, send and receive operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Public key material could not be parsed
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// Key agreement or derivation failed
    #[error("key agreement failed: {0}")]
    KeyAgreement(String),

    /// Exchange header could not be parsed or is inconsistent
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Envelope is structurally invalid
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Signature did not verify under the claimed sender's key
    ///
    /// Indicates impersonation or tampering in transit.
    #[error("invalid signature")]
    InvalidSignature,

    /// AEAD tag mismatch: tampered ciphertext or wrong key
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Authenticated plaintext has an unknown format, or is a legacy
    /// payload while those are disabled
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Embedded timestamp is older than the allowed window
    #[error("message too old ({age_ms} ms > {max_age_ms} ms), possible replay")]
    StaleMessage {
        /// How old the message is
        age_ms: u64,
        /// Allowed maximum
        max_age_ms: u64,
    },

    /// Embedded timestamp is too far in the future
    #[error(
        "message from the future ({ahead_ms} ms > {max_skew_ms} ms), possible replay or clock \
         manipulation"
    )]
    FutureTimestamp {
        /// How far ahead the message claims to be
        ahead_ms: u64,
        /// Allowed clock skew
        max_skew_ms: u64,
    },

    /// Sequence number not strictly greater than the last accepted one
    #[error("replay rejected: sequence {sequence} from {from}, last accepted {last_accepted}")]
    ReplayRejected {
        /// Sender
        from: PartyId,
        /// Sequence number on the envelope
        sequence: u64,
        /// Highest sequence number accepted so far
        last_accepted: u64,
    },

    /// No public key is published for this party
    #[error("unknown remote party: {0}")]
    UnknownRemoteParty(PartyId),

    /// No usable session with this id
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Exchange method called in the wrong state
    #[error("invalid state {state:?} for operation {operation}")]
    InvalidState {
        /// State the exchange was in
        state: ExchangeState,
        /// Operation that was attempted
        operation: String,
    },

    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// The delivery channel refused the envelope
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Local persistence failed
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// True for verification failures that indicate tampering, impersonation
    /// or replay. These must be logged and never retried.
    pub fn is_security_critical(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature
                | Self::AuthenticationFailed
                | Self::MalformedPayload(_)
                | Self::StaleMessage { .. }
                | Self::FutureTimestamp { .. }
                | Self::ReplayRejected { .. }
        )
    }

    /// True if the same call may succeed later: backend storage failures
    /// and delivery failures.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(StorageError::Backend(_)) | Self::Delivery(_))
    }
}

impl From<CryptoError> for SessionError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidKeyFormat(reason) => Self::InvalidKeyFormat(reason),
            CryptoError::KeyAgreement(reason) => Self::KeyAgreement(reason),
            CryptoError::InvalidSignature => Self::InvalidSignature,
            CryptoError::AuthenticationFailed => Self::AuthenticationFailed,
            CryptoError::InvalidIv { .. } => Self::MalformedEnvelope(err.to_string()),
            CryptoError::StaleMessage { age_ms, max_age_ms } => {
                Self::StaleMessage { age_ms, max_age_ms }
            },
            CryptoError::FutureTimestamp { ahead_ms, max_skew_ms } => {
                Self::FutureTimestamp { ahead_ms, max_skew_ms }
            },
            CryptoError::MalformedPayload(reason) => Self::MalformedPayload(reason),
            CryptoError::LegacyPayloadRejected => Self::MalformedPayload(err.to_string()),
            CryptoError::EncryptionFailed => Self::EncryptionFailed,
        }
    }
}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::MalformedHeader(reason) => Self::MalformedHeader(reason),
            ProtocolError::InvalidHex { .. } => Self::InvalidKeyFormat(err.to_string()),
            other => Self::MalformedEnvelope(other.to_string()),
        }
    }
}
