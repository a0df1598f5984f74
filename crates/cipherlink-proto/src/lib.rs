//! Wire format for the Cipherlink protocol.
//!
//! Everything the untrusted relay stores or forwards is defined here: the
//! signed exchange header that bootstraps a session, the encrypted envelope
//! that carries every message, and the identity record served by the public
//! key directory. All structured data is CBOR (via `ciborium`); field names
//! are camelCase so the same types map onto the JSON shapes used by other
//! clients.
//!
//! This crate performs no cryptography. It only fixes the byte sequences that
//! get signed and verified, so that initiator and responder agree on them
//! exactly.
//!
//! # Security
//!
//! Decoding is bounded: envelopes above [`Envelope::MAX_SIZE`] are rejected
//! before CBOR parsing, and identifiers are validated on deserialization so a
//! malformed peer cannot smuggle separator characters into a key-derivation
//! context.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod codec;
pub mod envelope;
pub mod errors;
pub mod header;
pub mod identity;
pub mod ids;

pub use envelope::Envelope;
pub use errors::{ProtocolError, Result};
pub use header::{ExchangeHeader, SignedHeader, exchange_context};
pub use identity::IdentityRecord;
pub use ids::{PartyId, SessionId};
