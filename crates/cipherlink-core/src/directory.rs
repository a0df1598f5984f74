//! Public key directory seam.
//!
//! The directory answers `identity(party)` with hex-encoded public keys and a
//! fingerprint. Its answer is trusted as-is: the signing key it returns is
//! what exchange headers and envelopes are verified against. Comparing the
//! fingerprint out of band is up to the application.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock, PoisonError},
};

use cipherlink_crypto::{AgreementPublicKey, PublicIdentity, SigningPublicKey};
use cipherlink_proto::{IdentityRecord, PartyId};

use crate::error::SessionError;

/// Lookup of published identities.
pub trait KeyDirectory: Send + Sync {
    /// Published record for `party`, if any.
    fn identity(&self, party: &PartyId) -> Option<IdentityRecord>;
}

impl<T: KeyDirectory + ?Sized> KeyDirectory for Arc<T> {
    fn identity(&self, party: &PartyId) -> Option<IdentityRecord> {
        (**self).identity(party)
    }
}

/// Wire record for a public identity.
pub fn record_for(identity: &PublicIdentity) -> IdentityRecord {
    IdentityRecord {
        signing_public_key: hex::encode(identity.signing.to_bytes()),
        agreement_public_key: hex::encode(identity.agreement.to_bytes()),
        fingerprint: identity.fingerprint().to_string(),
    }
}

/// Parse a wire record into usable public keys.
pub fn parse_record(record: &IdentityRecord) -> Result<PublicIdentity, SessionError> {
    let signing = SigningPublicKey::from_bytes(&record.signing_key_bytes()?)?;
    let agreement = AgreementPublicKey::from_bytes(&record.agreement_key_bytes()?)?;
    Ok(PublicIdentity { signing, agreement })
}

/// Look up and parse `party`'s identity.
///
/// Fails with [`SessionError::UnknownRemoteParty`] if nothing is published.
pub fn resolve(
    directory: &(impl KeyDirectory + ?Sized),
    party: &PartyId,
) -> Result<PublicIdentity, SessionError> {
    let record =
        directory.identity(party).ok_or_else(|| SessionError::UnknownRemoteParty(party.clone()))?;
    parse_record(&record)
}

/// Directory held in memory.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    records: RwLock<HashMap<PartyId, IdentityRecord>>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `identity` under `party`, replacing any earlier record.
    pub fn publish(&self, party: PartyId, identity: &PublicIdentity) {
        self.insert_record(party, record_for(identity));
    }

    /// Store a raw record without validation.
    pub fn insert_record(&self, party: PartyId, record: IdentityRecord) {
        self.records.write().unwrap_or_else(PoisonError::into_inner).insert(party, record);
    }
}

impl KeyDirectory for MemoryDirectory {
    fn identity(&self, party: &PartyId) -> Option<IdentityRecord> {
        self.records.read().unwrap_or_else(PoisonError::into_inner).get(party).cloned()
    }
}
