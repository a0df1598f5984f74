//! Cryptographic primitives for end-to-end encrypted direct messages.
//!
//! Each party holds a long-term identity: an Ed25519 signing pair for
//! authenticity and an X25519 pair for key agreement. To open a session the
//! initiator generates a fresh X25519 ephemeral pair, agrees with the
//! responder's long-term agreement key, and runs HKDF-SHA256 over the shared
//! secret with a context string that binds both parties and the initiation
//! time. The resulting 256-bit key protects every message with AES-256-GCM.
//!
//! Plaintexts are framed with an explicit format tag and a sender timestamp
//! before encryption so the receiver can reject stale or future-dated
//! messages after authenticating them.
//!
//! # Security
//!
//! Forward secrecy comes from the ephemeral key, which is consumed by the
//! derivation and cannot be reused. Private keys have no export path. Every
//! encryption draws a fresh random 96-bit IV from the caller-supplied CSPRNG.
//! Time and randomness are always parameters, never ambient.

pub mod cipher;
pub mod error;
pub mod fingerprint;
pub mod kdf;
pub mod keys;
pub mod payload;

pub use cipher::{
    FreshnessPolicy, IV_LEN, Sealed, decrypt, decrypt_file, encrypt, encrypt_file, open,
    open_payload, seal_payload,
};
pub use error::CryptoError;
pub use fingerprint::Fingerprint;
pub use kdf::{HKDF_SALT, SESSION_KEY_LEN, SessionKey, derive_session_key};
pub use keys::{
    AgreementKeyPair, AgreementPublicKey, EphemeralKeyPair, IdentityKeyPair, KeyAgreement,
    PublicIdentity, PublicKey, PublicKeyRole, SharedSecret, SigningKeyPair, SigningPublicKey,
    export_public_key, import_public_key,
};
pub use payload::Payload;
