//! Persistent session store on a redb file.
//!
//! One redb write transaction per store operation. redb serializes writers,
//! so read-modify-write sequences such as [`SessionStore::next_send_sequence`]
//! cannot interleave across threads or handles on the same file.

use std::{fmt::Display, path::Path};

use ::redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};
use cipherlink_crypto::{SESSION_KEY_LEN, SessionKey};
use cipherlink_proto::{PartyId, SessionId};
use serde::{Deserialize, Serialize};

use super::{PendingInitiation, SessionRecord, SessionStore};
use crate::error::StorageError;

/// Session id -> CBOR [`StoredSession`]
const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

/// Remote party id -> last send sequence issued
const SEND_SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("send_sequences");

/// Remote party id -> last receive sequence accepted
const RECEIVE_SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("receive_sequences");

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSession {
    session_id: SessionId,
    remote_party_id: PartyId,
    key: Vec<u8>,
    created_at_ms: u64,
    #[serde(default)]
    initiation: Option<StoredInitiation>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredInitiation {
    ephemeral_public_key: Vec<u8>,
    header_bytes: Vec<u8>,
}

fn backend(err: impl Display) -> StorageError {
    StorageError::Backend(err.to_string())
}

fn encode_session(record: &SessionRecord) -> Result<Vec<u8>, StorageError> {
    let stored = StoredSession {
        session_id: record.session_id.clone(),
        remote_party_id: record.remote_party_id.clone(),
        key: record.key.as_bytes().to_vec(),
        created_at_ms: record.created_at_ms,
        initiation: record.initiation.as_ref().map(|initiation| StoredInitiation {
            ephemeral_public_key: initiation.ephemeral_public_key.clone(),
            header_bytes: initiation.header_bytes.clone(),
        }),
    };
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&stored, &mut bytes).map_err(backend)?;
    Ok(bytes)
}

fn decode_session(key: &str, bytes: &[u8]) -> Result<SessionRecord, StorageError> {
    let corrupt = |reason: String| StorageError::Corrupt { key: key.to_string(), reason };

    let stored: StoredSession =
        ciborium::de::from_reader(bytes).map_err(|e| corrupt(e.to_string()))?;
    let raw = <[u8; SESSION_KEY_LEN]>::try_from(stored.key.as_slice())
        .map_err(|_| corrupt(format!("session key is {} bytes", stored.key.len())))?;

    Ok(SessionRecord {
        session_id: stored.session_id,
        remote_party_id: stored.remote_party_id,
        key: SessionKey::from_bytes(raw),
        created_at_ms: stored.created_at_ms,
        initiation: stored.initiation.map(|initiation| PendingInitiation {
            ephemeral_public_key: initiation.ephemeral_public_key,
            header_bytes: initiation.header_bytes,
        }),
    })
}

/// Session store persisted in a single redb database file.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path).map_err(backend)?;
        let store = Self { db };

        // Create tables up front so read transactions never see them missing.
        store.write(|txn| {
            txn.open_table(SESSIONS).map_err(backend)?;
            txn.open_table(SEND_SEQUENCES).map_err(backend)?;
            txn.open_table(RECEIVE_SEQUENCES).map_err(backend)?;
            Ok(())
        })?;

        Ok(store)
    }

    fn write<T>(
        &self,
        op: impl FnOnce(&WriteTransaction) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let txn = self.db.begin_write().map_err(backend)?;
        let value = op(&txn)?;
        txn.commit().map_err(backend)?;
        Ok(value)
    }

    fn read<T>(
        &self,
        op: impl FnOnce(&ReadTransaction) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let txn = self.db.begin_read().map_err(backend)?;
        op(&txn)
    }

    fn read_counter(
        &self,
        table: TableDefinition<'static, &'static str, u64>,
        party: &PartyId,
    ) -> Result<u64, StorageError> {
        self.read(|txn| {
            let table = txn.open_table(table).map_err(backend)?;
            let value = table.get(party.as_str()).map_err(backend)?.map(|guard| guard.value());
            Ok(value.unwrap_or(0))
        })
    }
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl SessionStore for RedbStore {
    fn put_session(&self, record: SessionRecord) -> Result<SessionRecord, StorageError> {
        self.write(move |txn| {
            let mut table = txn.open_table(SESSIONS).map_err(backend)?;
            let key = record.session_id.as_str();

            let existing = table
                .get(key)
                .map_err(backend)?
                .map(|guard| decode_session(key, guard.value()))
                .transpose()?;
            if let Some(existing) = existing {
                return Ok(existing);
            }

            let bytes = encode_session(&record)?;
            table.insert(key, bytes.as_slice()).map_err(backend)?;
            Ok(record)
        })
    }

    fn get_session(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, StorageError> {
        self.read(|txn| {
            let table = txn.open_table(SESSIONS).map_err(backend)?;
            let key = session_id.as_str();
            let record = table
                .get(key)
                .map_err(backend)?
                .map(|guard| decode_session(key, guard.value()))
                .transpose()?;
            Ok(record)
        })
    }

    fn latest_session_for(&self, party: &PartyId) -> Result<Option<SessionRecord>, StorageError> {
        self.read(|txn| {
            let table = txn.open_table(SESSIONS).map_err(backend)?;
            let mut latest: Option<SessionRecord> = None;

            for entry in table.iter().map_err(backend)? {
                let (key, value) = entry.map_err(backend)?;
                let record = decode_session(key.value(), value.value())?;
                if &record.remote_party_id != party {
                    continue;
                }
                let newer = latest.as_ref().is_none_or(|best| {
                    (record.created_at_ms, &record.session_id)
                        > (best.created_at_ms, &best.session_id)
                });
                if newer {
                    latest = Some(record);
                }
            }

            Ok(latest)
        })
    }

    fn remove_session(&self, session_id: &SessionId) -> Result<bool, StorageError> {
        self.write(|txn| {
            let mut table = txn.open_table(SESSIONS).map_err(backend)?;
            let removed = table.remove(session_id.as_str()).map_err(backend)?.is_some();
            Ok(removed)
        })
    }

    fn confirm_session(&self, session_id: &SessionId) -> Result<bool, StorageError> {
        self.write(|txn| {
            let mut table = txn.open_table(SESSIONS).map_err(backend)?;
            let key = session_id.as_str();

            let record = table
                .get(key)
                .map_err(backend)?
                .map(|guard| decode_session(key, guard.value()))
                .transpose()?;
            let Some(mut record) = record else {
                return Ok(false);
            };
            if record.initiation.take().is_none() {
                return Ok(false);
            }

            let bytes = encode_session(&record)?;
            table.insert(key, bytes.as_slice()).map_err(backend)?;
            Ok(true)
        })
    }

    fn evict_sessions_before(&self, cutoff_ms: u64) -> Result<usize, StorageError> {
        self.write(|txn| {
            let mut table = txn.open_table(SESSIONS).map_err(backend)?;

            let mut expired = Vec::new();
            for entry in table.iter().map_err(backend)? {
                let (key, value) = entry.map_err(backend)?;
                let record = decode_session(key.value(), value.value())?;
                if record.created_at_ms < cutoff_ms {
                    expired.push(key.value().to_string());
                }
            }

            for key in &expired {
                table.remove(key.as_str()).map_err(backend)?;
            }
            Ok(expired.len())
        })
    }

    fn next_send_sequence(&self, party: &PartyId) -> Result<u64, StorageError> {
        self.write(|txn| {
            let mut table = txn.open_table(SEND_SEQUENCES).map_err(backend)?;
            let last = table.get(party.as_str()).map_err(backend)?.map(|guard| guard.value());
            let next = last.unwrap_or(0) + 1;
            table.insert(party.as_str(), next).map_err(backend)?;
            Ok(next)
        })
    }

    fn send_sequence(&self, party: &PartyId) -> Result<u64, StorageError> {
        self.read_counter(SEND_SEQUENCES, party)
    }

    fn put_sequence(&self, party: &PartyId, sequence: u64) -> Result<(), StorageError> {
        self.write(|txn| {
            let mut table = txn.open_table(RECEIVE_SEQUENCES).map_err(backend)?;
            table.insert(party.as_str(), sequence).map_err(backend)?;
            Ok(())
        })
    }

    fn get_sequence(&self, party: &PartyId) -> Result<u64, StorageError> {
        self.read_counter(RECEIVE_SEQUENCES, party)
    }

    fn advance_sequence(&self, party: &PartyId, sequence: u64) -> Result<bool, StorageError> {
        self.write(|txn| {
            let mut table = txn.open_table(RECEIVE_SEQUENCES).map_err(backend)?;
            let last = table.get(party.as_str()).map_err(backend)?.map(|guard| guard.value());
            if sequence <= last.unwrap_or(0) {
                return Ok(false);
            }
            table.insert(party.as_str(), sequence).map_err(backend)?;
            Ok(true)
        })
    }

    fn clear_all(&self) -> Result<(), StorageError> {
        self.write(|txn| {
            txn.delete_table(SESSIONS).map_err(backend)?;
            txn.delete_table(SEND_SEQUENCES).map_err(backend)?;
            txn.delete_table(RECEIVE_SEQUENCES).map_err(backend)?;

            txn.open_table(SESSIONS).map_err(backend)?;
            txn.open_table(SEND_SEQUENCES).map_err(backend)?;
            txn.open_table(RECEIVE_SEQUENCES).map_err(backend)?;
            Ok(())
        })
    }
}
