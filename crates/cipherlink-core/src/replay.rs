//! Sequence-number replay guard.
//!
//! Every envelope from a sender carries a sequence number that must be
//! strictly greater than the last one accepted from that sender. This catches
//! immediate re-submission of a captured envelope even inside the timestamp
//! window; the timestamp check in the cipher catches envelopes replayed after
//! counter state was cleared. Both must pass.
//!
//! Counters live in the [`SessionStore`], so they survive restarts when the
//! store does and are updated atomically.

use cipherlink_proto::PartyId;

use crate::{error::StorageError, storage::SessionStore};

/// Send and receive counters over a session store.
#[derive(Debug)]
pub struct ReplayGuard<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: SessionStore + ?Sized> ReplayGuard<'a, S> {
    /// Guard backed by `store`.
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Next sequence number for an envelope to `remote`. Starts at 1.
    ///
    /// Atomic: concurrent callers never get the same number.
    pub fn next_send_sequence(&self, remote: &PartyId) -> Result<u64, StorageError> {
        self.store.next_send_sequence(remote)
    }

    /// Accept `sequence` from `remote` if it is newer than anything accepted
    /// before.
    ///
    /// A sender with no history has last-accepted 0. A rejected sequence
    /// leaves the stored state untouched.
    pub fn accept_sequence(&self, remote: &PartyId, sequence: u64) -> Result<bool, StorageError> {
        self.store.advance_sequence(remote, sequence)
    }

    /// Whether `accept_sequence` would accept `sequence` right now. Reads
    /// only; a concurrent acceptance can still win the race.
    pub fn would_accept(&self, remote: &PartyId, sequence: u64) -> Result<bool, StorageError> {
        Ok(sequence > self.store.get_sequence(remote)?)
    }

    /// Highest sequence accepted from `remote` so far.
    pub fn last_accepted(&self, remote: &PartyId) -> Result<u64, StorageError> {
        self.store.get_sequence(remote)
    }
}
