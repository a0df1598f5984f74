//! Local session store.
//!
//! Holds derived session keys and per-party sequence counters. Every method
//! is a single atomic operation: implementations either hold one lock or run
//! one database transaction per call, which is what gives the protocol its
//! per-key mutual exclusion.
//!
//! # Records
//!
//! - Sessions, keyed by [`SessionId`]. Written once per exchange. The only
//!   in-place update is [`SessionStore::confirm_session`] dropping the
//!   initiator's pending initiation material.
//! - Send counters, keyed by remote [`PartyId`]. Last sequence number issued.
//! - Receive counters, keyed by remote [`PartyId`]. Last sequence number
//!   accepted.

mod memory;
mod redb;

use std::sync::Arc;

use cipherlink_crypto::SessionKey;
use cipherlink_proto::{PartyId, SessionId};

pub use self::{memory::MemoryStore, redb::RedbStore};
use crate::error::StorageError;

/// Initiation material the initiator keeps attaching to envelopes until the
/// peer is known to hold the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInitiation {
    /// Raw ephemeral public key, as carried in `ephemeralPublicKey`
    pub ephemeral_public_key: Vec<u8>,
    /// CBOR `SignedHeader`, as carried in `headerBytes`
    pub header_bytes: Vec<u8>,
}

/// A derived session key and what it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Session identifier, as carried on every envelope
    pub session_id: SessionId,
    /// The other party of the session
    pub remote_party_id: PartyId,
    /// Symmetric key
    pub key: SessionKey,
    /// When the session was created, ms since the epoch. The responder
    /// takes the initiator's header timestamp so both sides expire together.
    pub created_at_ms: u64,
    /// Set on the initiator's side until the initiation is handed off
    pub initiation: Option<PendingInitiation>,
}

/// Persistence for sessions and sequence counters.
pub trait SessionStore: Send + Sync {
    /// Store a session unless one with the same id already exists.
    ///
    /// Returns the record that ends up stored: `record` itself, or the one
    /// that was there first.
    fn put_session(&self, record: SessionRecord) -> Result<SessionRecord, StorageError>;

    /// Look up a session by id.
    fn get_session(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, StorageError>;

    /// Most recently created session with `party`. Ties go to the greater
    /// session id.
    fn latest_session_for(&self, party: &PartyId) -> Result<Option<SessionRecord>, StorageError>;

    /// Delete one session. Returns whether it existed.
    fn remove_session(&self, session_id: &SessionId) -> Result<bool, StorageError>;

    /// Drop the pending initiation from a session. Returns whether there was
    /// one to drop.
    fn confirm_session(&self, session_id: &SessionId) -> Result<bool, StorageError>;

    /// Delete every session created before `cutoff_ms`. Returns how many.
    fn evict_sessions_before(&self, cutoff_ms: u64) -> Result<usize, StorageError>;

    /// Increment and return the send counter for `party`. The first call
    /// returns 1.
    fn next_send_sequence(&self, party: &PartyId) -> Result<u64, StorageError>;

    /// Last send sequence issued to `party`, 0 if none.
    fn send_sequence(&self, party: &PartyId) -> Result<u64, StorageError>;

    /// Overwrite the receive counter for `party`.
    fn put_sequence(&self, party: &PartyId, sequence: u64) -> Result<(), StorageError>;

    /// Last sequence accepted from `party`, 0 if none.
    fn get_sequence(&self, party: &PartyId) -> Result<u64, StorageError>;

    /// Raise the receive counter for `party` to `sequence` if it is strictly
    /// greater than the stored value. Returns whether it was raised.
    fn advance_sequence(&self, party: &PartyId, sequence: u64) -> Result<bool, StorageError>;

    /// Delete everything (logout or key reset).
    fn clear_all(&self) -> Result<(), StorageError>;
}

impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    fn put_session(&self, record: SessionRecord) -> Result<SessionRecord, StorageError> {
        (**self).put_session(record)
    }

    fn get_session(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, StorageError> {
        (**self).get_session(session_id)
    }

    fn latest_session_for(&self, party: &PartyId) -> Result<Option<SessionRecord>, StorageError> {
        (**self).latest_session_for(party)
    }

    fn remove_session(&self, session_id: &SessionId) -> Result<bool, StorageError> {
        (**self).remove_session(session_id)
    }

    fn confirm_session(&self, session_id: &SessionId) -> Result<bool, StorageError> {
        (**self).confirm_session(session_id)
    }

    fn evict_sessions_before(&self, cutoff_ms: u64) -> Result<usize, StorageError> {
        (**self).evict_sessions_before(cutoff_ms)
    }

    fn next_send_sequence(&self, party: &PartyId) -> Result<u64, StorageError> {
        (**self).next_send_sequence(party)
    }

    fn send_sequence(&self, party: &PartyId) -> Result<u64, StorageError> {
        (**self).send_sequence(party)
    }

    fn put_sequence(&self, party: &PartyId, sequence: u64) -> Result<(), StorageError> {
        (**self).put_sequence(party, sequence)
    }

    fn get_sequence(&self, party: &PartyId) -> Result<u64, StorageError> {
        (**self).get_sequence(party)
    }

    fn advance_sequence(&self, party: &PartyId, sequence: u64) -> Result<bool, StorageError> {
        (**self).advance_sequence(party, sequence)
    }

    fn clear_all(&self) -> Result<(), StorageError> {
        (**self).clear_all()
    }
}
