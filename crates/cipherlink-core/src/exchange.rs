//! Authenticated exchange state machine.
//!
//! One [`Exchange`] per attempt to establish a session. The initiator
//! generates an ephemeral X25519 pair, derives the session key against the
//! responder's long-term agreement key, and signs a header carrying the
//! ephemeral public key and the derivation context. The responder verifies
//! that signature against the initiator's long-term signing key before
//! deriving anything.
//!
//! Signing the header authenticates the key-exchange material itself: a
//! relay that swaps the ephemeral key in transit breaks the signature.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ initiate ┌───────────┐ persisted ┌─────────┐
//! │ Idle │─────────>│ Initiated │──────────>│ Derived │
//! └──────┘          └───────────┘           └─────────┘
//!    │                                           ^
//!    │ verify       ┌──────────┐ commit          │
//!    ├─────────────>│ Verified │─────────────────┘
//!    │              └──────────┘
//!    │ error (any step)
//!    └──────────────>┌────────┐
//!                    │ Failed │
//!                    └────────┘
//! ```
//!
//! The responder splits completion in two. [`Exchange::verify`] checks the
//! header and derives the key without touching the store, so the caller can
//! decrypt and replay-check the envelope first; [`Exchange::commit`] then
//! persists the session. [`Exchange::complete`] does both at once.
//!
//! Methods take time and randomness as parameters.

use cipherlink_crypto::{
    AgreementPublicKey, EphemeralKeyPair, IdentityKeyPair, SessionKey, SigningPublicKey,
    derive_session_key,
};
use cipherlink_proto::{ExchangeHeader, PartyId, SessionId, SignedHeader, exchange_context};
use rand::{CryptoRng, RngCore};

use crate::{
    error::{SessionError, StorageError},
    storage::{PendingInitiation, SessionRecord, SessionStore},
};

/// Exchange state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Nothing done yet
    Idle,
    /// Ephemeral key generated and header signed, session not yet stored
    Initiated,
    /// Header verified and key derived by the responder, session not yet
    /// stored
    Verified,
    /// Session key derived and stored
    Derived,
    /// Exchange aborted; create a new one to retry
    Failed,
}

/// Everything the initiator transmits, plus its own copy of the key.
#[derive(Debug)]
pub struct ExchangeResult {
    /// Identifier of the new session
    pub session_id: SessionId,
    /// Public half of the ephemeral pair
    pub ephemeral_public_key: AgreementPublicKey,
    /// Header as signed
    pub header: ExchangeHeader,
    /// Exact bytes that were signed
    pub header_bytes: Vec<u8>,
    /// Initiator's signature over `header_bytes`
    pub signature: Vec<u8>,
    /// Derived session key (never transmitted)
    pub session_key: SessionKey,
}

impl ExchangeResult {
    /// Header bytes and signature in their wire container.
    pub fn signed_header(&self) -> SignedHeader {
        SignedHeader { header_bytes: self.header_bytes.clone(), signature: self.signature.clone() }
    }

    /// The envelope fields that carry this initiation.
    pub fn pending_initiation(&self) -> Result<PendingInitiation, SessionError> {
        Ok(PendingInitiation {
            ephemeral_public_key: self.ephemeral_public_key.to_bytes().to_vec(),
            header_bytes: self.signed_header().to_bytes()?,
        })
    }
}

/// Responder's outcome.
#[derive(Debug)]
pub struct CompletedExchange {
    /// Initiator
    pub remote_party_id: PartyId,
    /// Session identifier taken from the header
    pub session_id: SessionId,
    /// Derived session key, identical to the initiator's
    pub session_key: SessionKey,
    /// Initiator's clock at initiation, from the header
    pub initiated_at_ms: u64,
}

/// One exchange attempt on behalf of a local party.
#[derive(Debug)]
pub struct Exchange<'a> {
    local: &'a PartyId,
    identity: &'a IdentityKeyPair,
    state: ExchangeState,
    session_id: Option<SessionId>,
}

impl<'a> Exchange<'a> {
    /// Create an exchange in Idle state for `local`, who owns `identity`.
    pub fn new(local: &'a PartyId, identity: &'a IdentityKeyPair) -> Self {
        Self { local, identity, state: ExchangeState::Idle, session_id: None }
    }

    /// Get current state
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Session this exchange produced (once past Idle)
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Start a session with `remote`.
    ///
    /// 1. Generate an ephemeral pair
    /// 2. Build the context `local || remote || now_ms`
    /// 3. Derive the session key (ephemeral private, remote agreement public)
    /// 4. Draw a random 128-bit session id
    /// 5. Serialize and sign the header
    /// 6. Persist the session record, with the initiation pending
    ///
    /// # Errors
    ///
    /// - `InvalidState` if not Idle
    /// - `KeyAgreement` if `remote_agreement` is a low-order point
    /// - `Storage` if the record cannot be written
    pub fn initiate<S: SessionStore + ?Sized>(
        &mut self,
        remote: &PartyId,
        remote_agreement: &AgreementPublicKey,
        store: &S,
        now_ms: u64,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<ExchangeResult, SessionError> {
        self.require(ExchangeState::Idle, "initiate")?;
        let result = self.run_initiate(remote, remote_agreement, store, now_ms, rng);
        self.finish(result, ExchangeState::Derived)
    }

    /// Check a header `remote` signed and derive its session key. Stores
    /// nothing.
    ///
    /// 1. Verify the header signature under `remote_signing`
    /// 2. Parse the header and check it names this exchange
    /// 3. Derive the session key (local agreement private, ephemeral public)
    ///    using the context exactly as signed
    ///
    /// # Errors
    ///
    /// - `InvalidState` if not Idle
    /// - `InvalidSignature` if the signature does not verify. Treat as a
    ///   possible impersonation, never retry.
    /// - `MalformedHeader` if the header does not parse, its ephemeral key
    ///   differs from `ephemeral_public_key`, or its context names other
    ///   parties
    /// - `KeyAgreement` if the ephemeral key is unusable
    pub fn verify(
        &mut self,
        remote: &PartyId,
        remote_signing: &SigningPublicKey,
        ephemeral_public_key: &[u8],
        signed: &SignedHeader,
    ) -> Result<CompletedExchange, SessionError> {
        self.require(ExchangeState::Idle, "verify")?;
        let result = self.run_verify(remote, remote_signing, ephemeral_public_key, signed);
        self.finish(result, ExchangeState::Verified)
    }

    /// Persist a session [`Exchange::verify`] produced.
    ///
    /// The record is dated with the initiator's timestamp (or `now_ms` if
    /// that lies ahead), so it expires when the initiator's copy does.
    /// Committing a session that is already stored is harmless as long as
    /// the stored key matches.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if not Verified
    /// - `Storage` with `Conflict` if the session id holds a different key
    pub fn commit<S: SessionStore + ?Sized>(
        &mut self,
        completed: &CompletedExchange,
        store: &S,
        now_ms: u64,
    ) -> Result<(), SessionError> {
        self.require(ExchangeState::Verified, "commit")?;
        let result = persist(store, SessionRecord {
            session_id: completed.session_id.clone(),
            remote_party_id: completed.remote_party_id.clone(),
            key: completed.session_key.clone(),
            created_at_ms: completed.initiated_at_ms.min(now_ms),
            initiation: None,
        })
        .map(|_| {
            tracing::debug!(
                local = %self.local,
                remote = %completed.remote_party_id,
                session = %completed.session_id,
                "exchange completed"
            );
        });
        self.finish(result, ExchangeState::Derived)
    }

    /// Accept a session `remote` initiated: [`Exchange::verify`] then
    /// [`Exchange::commit`].
    ///
    /// Completing the same header twice is harmless: the second call finds
    /// the stored record and returns the same key.
    pub fn complete<S: SessionStore + ?Sized>(
        &mut self,
        remote: &PartyId,
        remote_signing: &SigningPublicKey,
        ephemeral_public_key: &[u8],
        signed: &SignedHeader,
        store: &S,
        now_ms: u64,
    ) -> Result<CompletedExchange, SessionError> {
        let completed = self.verify(remote, remote_signing, ephemeral_public_key, signed)?;
        self.commit(&completed, store, now_ms)?;
        Ok(completed)
    }

    fn run_initiate<S: SessionStore + ?Sized>(
        &mut self,
        remote: &PartyId,
        remote_agreement: &AgreementPublicKey,
        store: &S,
        now_ms: u64,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<ExchangeResult, SessionError> {
        let ephemeral = EphemeralKeyPair::generate(rng);
        let ephemeral_public_key = ephemeral.public_key();

        let context = exchange_context(self.local, remote, now_ms);
        let session_key = ephemeral.into_session_key(remote_agreement, &context)?;

        let mut raw_id = [0u8; SessionId::LEN];
        rng.fill_bytes(&mut raw_id);
        let session_id = SessionId::from_bytes(raw_id);

        let header = ExchangeHeader {
            ephemeral_public_key: ephemeral_public_key.to_bytes().to_vec(),
            session_id: session_id.clone(),
            timestamp_ms: now_ms,
            context,
        };
        let header_bytes = header.to_bytes()?;
        let signature = self.identity.signing().sign(&header_bytes).to_vec();

        self.state = ExchangeState::Initiated;
        self.session_id = Some(session_id.clone());

        let result = ExchangeResult {
            session_id,
            ephemeral_public_key,
            header,
            header_bytes,
            signature,
            session_key,
        };

        persist(store, SessionRecord {
            session_id: result.session_id.clone(),
            remote_party_id: remote.clone(),
            key: result.session_key.clone(),
            created_at_ms: now_ms,
            initiation: Some(result.pending_initiation()?),
        })?;

        tracing::debug!(
            local = %self.local,
            %remote,
            session = %result.session_id,
            "exchange initiated"
        );
        Ok(result)
    }

    fn run_verify(
        &mut self,
        remote: &PartyId,
        remote_signing: &SigningPublicKey,
        ephemeral_public_key: &[u8],
        signed: &SignedHeader,
    ) -> Result<CompletedExchange, SessionError> {
        if !remote_signing.verify(&signed.header_bytes, &signed.signature) {
            return Err(SessionError::InvalidSignature);
        }

        let header = ExchangeHeader::from_bytes(&signed.header_bytes)?;
        self.session_id = Some(header.session_id.clone());

        if header.ephemeral_public_key != ephemeral_public_key {
            return Err(SessionError::MalformedHeader(
                "ephemeral key differs from the signed header".to_string(),
            ));
        }

        let Some((initiator, responder, timestamp_ms)) = header.context_parts() else {
            return Err(SessionError::MalformedHeader(format!(
                "unparseable context {:?}",
                header.context
            )));
        };
        if initiator != remote.as_str()
            || responder != self.local.as_str()
            || timestamp_ms != header.timestamp_ms
        {
            return Err(SessionError::MalformedHeader(format!(
                "context {:?} does not bind {remote} -> {}",
                header.context, self.local
            )));
        }

        let ephemeral = AgreementPublicKey::from_bytes(&header.ephemeral_public_key)
            .map_err(|e| SessionError::KeyAgreement(e.to_string()))?;
        let session_key =
            derive_session_key(self.identity.agreement(), &ephemeral, &header.context)?;

        Ok(CompletedExchange {
            remote_party_id: remote.clone(),
            session_id: header.session_id,
            session_key,
            initiated_at_ms: header.timestamp_ms,
        })
    }

    fn require(&self, expected: ExchangeState, operation: &str) -> Result<(), SessionError> {
        if self.state != expected {
            return Err(SessionError::InvalidState {
                state: self.state,
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    fn finish<T>(
        &mut self,
        result: Result<T, SessionError>,
        next: ExchangeState,
    ) -> Result<T, SessionError> {
        self.state = if result.is_ok() { next } else { ExchangeState::Failed };
        result
    }
}

/// Insert `record` unless its id is taken. A taken id is fine only if it
/// holds the same key for the same party.
fn persist<S: SessionStore + ?Sized>(
    store: &S,
    record: SessionRecord,
) -> Result<SessionRecord, SessionError> {
    let stored = store.put_session(record.clone())?;
    if stored.key != record.key || stored.remote_party_id != record.remote_party_id {
        return Err(StorageError::Conflict(record.session_id).into());
    }
    Ok(stored)
}
