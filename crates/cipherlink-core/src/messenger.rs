//! Per-party messaging facade.
//!
//! A [`Messenger`] owns one party's identity and wires the exchange, cipher,
//! replay guard and store together.
//!
//! # Sending
//!
//! 1. Reuse the newest session with the recipient if it is younger than the
//!    session TTL, otherwise run a new exchange
//! 2. Draw the next send sequence number for the recipient
//! 3. Encrypt the framed payload under the session key
//! 4. Attach the signed header while the session's initiation is pending
//! 5. Sign the envelope transcript
//!
//! An initiation stays pending until an envelope carrying it is handed to a
//! delivery channel, or until the peer sends on the session. A failed send
//! therefore leaves the session in place and the next envelope on it carries
//! the header again.
//!
//! # Receiving
//!
//! [`Messenger::handle_envelope`] runs, in order: structural validation,
//! sender lookup, envelope signature, header verification (first message of
//! a session) or session lookup, decryption with freshness checks, and the
//! sequence check. The first failure rejects the envelope and leaves the
//! store untouched; a new session and the sequence counter are written only
//! once every step has passed.

use cipherlink_crypto::{
    IdentityKeyPair, Payload, PublicIdentity, SessionKey, cipher, seal_payload,
};
use cipherlink_proto::{Envelope, PartyId, SessionId, SignedHeader};

use crate::{
    AUDIT_TARGET,
    config::ProtocolConfig,
    delivery::DeliveryChannel,
    directory::{self, KeyDirectory},
    env::{EnvRng, Environment},
    error::SessionError,
    exchange::{CompletedExchange, Exchange},
    replay::ReplayGuard,
    storage::{SessionRecord, SessionStore},
};

/// Decrypted content of an accepted envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// Text or structured message
    Message(Vec<u8>),
    /// File contents
    File(Vec<u8>),
    /// Untimestamped payload from an older client
    Legacy(Vec<u8>),
}

impl Content {
    /// Plaintext bytes regardless of kind.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Message(data) | Self::File(data) | Self::Legacy(data) => data,
        }
    }
}

/// An envelope that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    /// Sender, as reported by the delivery channel and verified by signature
    pub from: PartyId,
    /// Session the envelope was encrypted under
    pub session_id: SessionId,
    /// Accepted sequence number
    pub sequence_number: u64,
    /// Plaintext
    pub content: Content,
}

/// Key an incoming envelope decrypts under.
enum Session<'a> {
    /// Already stored
    Stored(SessionRecord),
    /// Verified from the envelope's header, stored once the envelope passes
    Pending(Exchange<'a>, CompletedExchange),
}

impl Session<'_> {
    fn key(&self) -> &SessionKey {
        match self {
            Self::Stored(record) => &record.key,
            Self::Pending(_, completed) => &completed.session_key,
        }
    }
}

/// One party's end of the protocol.
pub struct Messenger<S, K, E> {
    party: PartyId,
    identity: IdentityKeyPair,
    store: S,
    directory: K,
    env: E,
    config: ProtocolConfig,
}

impl<S, K, E> Messenger<S, K, E>
where
    S: SessionStore,
    K: KeyDirectory,
    E: Environment,
{
    /// Create a messenger with the default [`ProtocolConfig`].
    pub fn new(party: PartyId, identity: IdentityKeyPair, store: S, directory: K, env: E) -> Self {
        Self { party, identity, store, directory, env, config: ProtocolConfig::default() }
    }

    /// Replace the protocol configuration.
    #[must_use]
    pub fn with_config(mut self, config: ProtocolConfig) -> Self {
        self.config = config;
        self
    }

    /// Local party id.
    pub fn party(&self) -> &PartyId {
        &self.party
    }

    /// Public halves of the local identity, for publishing.
    pub fn public_identity(&self) -> PublicIdentity {
        self.identity.public_identity()
    }

    /// Underlying session store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Active configuration.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Encrypt a message for `to`.
    pub fn seal_message(&self, to: &PartyId, plaintext: &[u8]) -> Result<Envelope, SessionError> {
        let now_ms = self.env.now_millis();
        self.seal(to, &Payload::Message { data: plaintext.to_vec(), timestamp_ms: now_ms }, now_ms)
    }

    /// Encrypt a file for `to`.
    pub fn seal_file(&self, to: &PartyId, contents: &[u8]) -> Result<Envelope, SessionError> {
        let now_ms = self.env.now_millis();
        self.seal(to, &Payload::File { data: contents.to_vec(), timestamp_ms: now_ms }, now_ms)
    }

    /// Encrypt a message and hand it to `channel`. Returns its sequence
    /// number.
    pub fn send_message<D: DeliveryChannel + ?Sized>(
        &self,
        channel: &D,
        to: &PartyId,
        plaintext: &[u8],
    ) -> Result<u64, SessionError> {
        let envelope = self.seal_message(to, plaintext)?;
        self.deliver(channel, to, envelope)
    }

    /// Encrypt a file and hand it to `channel`. Returns its sequence number.
    pub fn send_file<D: DeliveryChannel + ?Sized>(
        &self,
        channel: &D,
        to: &PartyId,
        contents: &[u8],
    ) -> Result<u64, SessionError> {
        let envelope = self.seal_file(to, contents)?;
        self.deliver(channel, to, envelope)
    }

    /// Mark a session's initiation as delivered, so later envelopes stop
    /// carrying the header. Returns false if nothing was pending.
    ///
    /// [`Messenger::send_message`] and [`Messenger::send_file`] call this
    /// themselves; callers that move sealed envelopes some other way call it
    /// once the first one is out.
    pub fn confirm_delivered(&self, session_id: &SessionId) -> Result<bool, SessionError> {
        let confirmed = self.store.confirm_session(session_id)?;
        if confirmed {
            tracing::debug!(party = %self.party, session = %session_id, "initiation delivered");
        }
        Ok(confirmed)
    }

    /// Verify, decrypt and replay-check an envelope `from` delivered.
    ///
    /// Security-critical rejections are logged under [`AUDIT_TARGET`].
    pub fn handle_envelope(
        &self,
        from: &PartyId,
        envelope: &Envelope,
    ) -> Result<Received, SessionError> {
        let result = self.open_envelope(from, envelope);
        if let Err(err) = &result {
            self.audit(from, envelope, err);
        }
        result
    }

    /// Delete sessions older than the session TTL. Returns how many.
    pub fn evict_expired_sessions(&self) -> Result<usize, SessionError> {
        let cutoff_ms = self.env.now_millis().saturating_sub(self.config.session_ttl_ms());
        let evicted = self.store.evict_sessions_before(cutoff_ms)?;
        if evicted > 0 {
            tracing::info!(party = %self.party, evicted, "evicted expired sessions");
        }
        Ok(evicted)
    }

    /// Forget every session and counter (logout or key reset).
    pub fn clear_all(&self) -> Result<(), SessionError> {
        self.store.clear_all()?;
        tracing::info!(party = %self.party, "cleared session store");
        Ok(())
    }

    fn deliver<D: DeliveryChannel + ?Sized>(
        &self,
        channel: &D,
        to: &PartyId,
        envelope: Envelope,
    ) -> Result<u64, SessionError> {
        let sequence = envelope.sequence_number;
        let session_id = envelope.session_id.clone();
        let initiation = envelope.is_initiation();

        if let Err(err) = channel.send(to, &self.party, envelope) {
            if initiation {
                tracing::debug!(%to, session = %session_id, "initiation still pending");
            }
            return Err(SessionError::Delivery(err.to_string()));
        }

        if initiation
            && let Err(storage) = self.confirm_delivered(&session_id)
        {
            tracing::warn!(
                session = %session_id,
                error = %storage,
                "could not confirm delivered initiation"
            );
        }
        Ok(sequence)
    }

    fn seal(
        &self,
        to: &PartyId,
        payload: &Payload,
        now_ms: u64,
    ) -> Result<Envelope, SessionError> {
        let mut rng = EnvRng::new(&self.env);
        let ttl_ms = self.config.session_ttl_ms();

        let live = self
            .store
            .latest_session_for(to)?
            .filter(|record| now_ms.saturating_sub(record.created_at_ms) < ttl_ms);

        let (session_id, key, initiation) = if let Some(record) = live {
            (record.session_id, record.key, record.initiation)
        } else {
            let remote = directory::resolve(&self.directory, to)?;
            let mut exchange = Exchange::new(&self.party, &self.identity);
            let result =
                exchange.initiate(to, &remote.agreement, &self.store, now_ms, &mut rng)?;
            let pending = result.pending_initiation()?;
            (result.session_id, result.session_key, Some(pending))
        };

        let sequence_number = ReplayGuard::new(&self.store).next_send_sequence(to)?;
        let sealed = seal_payload(&key, payload, &mut rng)?;
        let (ephemeral_public_key, header_bytes) = initiation
            .map(|pending| (pending.ephemeral_public_key, pending.header_bytes))
            .unzip();

        let mut envelope = Envelope {
            ciphertext: sealed.ciphertext,
            iv: sealed.iv.to_vec(),
            session_id,
            ephemeral_public_key,
            header_bytes,
            signature: Vec::new(),
            sequence_number,
        };
        let transcript = envelope.signing_transcript()?;
        envelope.signature = self.identity.signing().sign(&transcript).to_vec();

        tracing::debug!(
            from = %self.party,
            %to,
            session = %envelope.session_id,
            sequence = sequence_number,
            initiation = envelope.is_initiation(),
            "sealed envelope"
        );
        Ok(envelope)
    }

    fn open_envelope(
        &self,
        from: &PartyId,
        envelope: &Envelope,
    ) -> Result<Received, SessionError> {
        envelope.validate()?;

        let sender = directory::resolve(&self.directory, from)?;
        if !sender.signing.verify(&envelope.signing_transcript()?, &envelope.signature) {
            return Err(SessionError::InvalidSignature);
        }

        let now_ms = self.env.now_millis();
        let session = self.session_for(from, &sender, envelope, now_ms)?;

        let payload = cipher::open(
            session.key(),
            &envelope.ciphertext,
            &envelope.iv,
            now_ms,
            &self.config.freshness_policy(),
        )?;

        let guard = ReplayGuard::new(&self.store);
        if !guard.would_accept(from, envelope.sequence_number)? {
            return Err(self.replay_rejected(&guard, from, envelope)?);
        }

        match session {
            Session::Pending(mut exchange, completed) => {
                exchange.commit(&completed, &self.store, now_ms)?;
            },
            Session::Stored(record) => {
                if record.initiation.is_some() {
                    self.confirm_delivered(&record.session_id)?;
                }
            },
        }

        if !guard.accept_sequence(from, envelope.sequence_number)? {
            return Err(self.replay_rejected(&guard, from, envelope)?);
        }

        let content = match payload {
            Payload::Message { data, .. } => Content::Message(data),
            Payload::File { data, .. } => Content::File(data),
            Payload::Legacy(data) => {
                tracing::warn!(
                    target: AUDIT_TARGET,
                    %from,
                    session = %envelope.session_id,
                    "accepted legacy payload without freshness marker"
                );
                Content::Legacy(data)
            },
        };

        tracing::debug!(
            to = %self.party,
            %from,
            session = %envelope.session_id,
            sequence = envelope.sequence_number,
            "accepted envelope"
        );

        Ok(Received {
            from: from.clone(),
            session_id: envelope.session_id.clone(),
            sequence_number: envelope.sequence_number,
            content,
        })
    }

    fn session_for(
        &self,
        from: &PartyId,
        sender: &PublicIdentity,
        envelope: &Envelope,
        now_ms: u64,
    ) -> Result<Session<'_>, SessionError> {
        let (Some(ephemeral), Some(header_bytes)) =
            (&envelope.ephemeral_public_key, &envelope.header_bytes)
        else {
            return self
                .store
                .get_session(&envelope.session_id)?
                .filter(|record| &record.remote_party_id == from)
                .map(Session::Stored)
                .ok_or_else(|| SessionError::SessionNotFound(envelope.session_id.clone()));
        };

        let signed = SignedHeader::from_bytes(header_bytes)?;
        let mut exchange = Exchange::new(&self.party, &self.identity);
        let verified = exchange.verify(from, &sender.signing, ephemeral, &signed)?;

        if verified.session_id != envelope.session_id {
            return Err(SessionError::MalformedHeader(format!(
                "header establishes {} but envelope names {}",
                verified.session_id, envelope.session_id
            )));
        }
        if now_ms.saturating_sub(verified.initiated_at_ms) >= self.config.session_ttl_ms() {
            return Err(SessionError::SessionNotFound(verified.session_id));
        }

        Ok(Session::Pending(exchange, verified))
    }

    fn replay_rejected(
        &self,
        guard: &ReplayGuard<'_, S>,
        from: &PartyId,
        envelope: &Envelope,
    ) -> Result<SessionError, SessionError> {
        Ok(SessionError::ReplayRejected {
            from: from.clone(),
            sequence: envelope.sequence_number,
            last_accepted: guard.last_accepted(from)?,
        })
    }

    fn audit(&self, from: &PartyId, envelope: &Envelope, err: &SessionError) {
        match err {
            SessionError::InvalidSignature => tracing::error!(
                target: AUDIT_TARGET,
                to = %self.party,
                %from,
                session = %envelope.session_id,
                sequence = envelope.sequence_number,
                "signature verification failed: possible impersonation or tampering"
            ),
            err if err.is_security_critical() => tracing::warn!(
                target: AUDIT_TARGET,
                to = %self.party,
                %from,
                session = %envelope.session_id,
                sequence = envelope.sequence_number,
                error = %err,
                "rejected envelope"
            ),
            err => tracing::debug!(
                to = %self.party,
                %from,
                session = %envelope.session_id,
                error = %err,
                "could not process envelope"
            ),
        }
    }
}

impl<S, K, E> std::fmt::Debug for Messenger<S, K, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("party", &self.party)
            .field("identity", &self.identity)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
