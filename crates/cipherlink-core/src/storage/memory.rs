//! In-memory session store.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use cipherlink_proto::{PartyId, SessionId};

use super::{SessionRecord, SessionStore};
use crate::error::StorageError;

#[derive(Debug, Default)]
struct State {
    sessions: HashMap<SessionId, SessionRecord>,
    send: HashMap<PartyId, u64>,
    receive: HashMap<PartyId, u64>,
}

/// Session store backed by hash maps behind a single mutex.
///
/// Lost on drop. Used by tests and the simulator.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // No operation panics between two map updates, so a poisoned lock
        // still guards consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for MemoryStore {
    fn put_session(&self, record: SessionRecord) -> Result<SessionRecord, StorageError> {
        let mut state = self.lock();
        Ok(state.sessions.entry(record.session_id.clone()).or_insert(record).clone())
    }

    fn get_session(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, StorageError> {
        Ok(self.lock().sessions.get(session_id).cloned())
    }

    fn latest_session_for(&self, party: &PartyId) -> Result<Option<SessionRecord>, StorageError> {
        Ok(self
            .lock()
            .sessions
            .values()
            .filter(|record| &record.remote_party_id == party)
            .max_by(|a, b| (a.created_at_ms, &a.session_id).cmp(&(b.created_at_ms, &b.session_id)))
            .cloned())
    }

    fn remove_session(&self, session_id: &SessionId) -> Result<bool, StorageError> {
        Ok(self.lock().sessions.remove(session_id).is_some())
    }

    fn confirm_session(&self, session_id: &SessionId) -> Result<bool, StorageError> {
        Ok(self
            .lock()
            .sessions
            .get_mut(session_id)
            .is_some_and(|record| record.initiation.take().is_some()))
    }

    fn evict_sessions_before(&self, cutoff_ms: u64) -> Result<usize, StorageError> {
        let mut state = self.lock();
        let before = state.sessions.len();
        state.sessions.retain(|_, record| record.created_at_ms >= cutoff_ms);
        Ok(before - state.sessions.len())
    }

    fn next_send_sequence(&self, party: &PartyId) -> Result<u64, StorageError> {
        let mut state = self.lock();
        let counter = state.send.entry(party.clone()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    fn send_sequence(&self, party: &PartyId) -> Result<u64, StorageError> {
        Ok(self.lock().send.get(party).copied().unwrap_or(0))
    }

    fn put_sequence(&self, party: &PartyId, sequence: u64) -> Result<(), StorageError> {
        self.lock().receive.insert(party.clone(), sequence);
        Ok(())
    }

    fn get_sequence(&self, party: &PartyId) -> Result<u64, StorageError> {
        Ok(self.lock().receive.get(party).copied().unwrap_or(0))
    }

    fn advance_sequence(&self, party: &PartyId, sequence: u64) -> Result<bool, StorageError> {
        let mut state = self.lock();
        let last = state.receive.get(party).copied().unwrap_or(0);
        if sequence <= last {
            return Ok(false);
        }
        state.receive.insert(party.clone(), sequence);
        Ok(true)
    }

    fn clear_all(&self) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.sessions.clear();
        state.send.clear();
        state.receive.clear();
        Ok(())
    }
}
