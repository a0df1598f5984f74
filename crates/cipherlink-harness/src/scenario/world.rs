//! World state for scenario execution.
//!
//! The World owns every party, the shared relay and clock, and records what
//! each party sent, accepted and rejected so oracles can check it afterwards.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use cipherlink_core::{
    EnvRng, MemoryDirectory, Messenger, ProtocolConfig, Received, SessionError, SessionStore,
};
use cipherlink_crypto::IdentityKeyPair;
use cipherlink_proto::PartyId;

use crate::{SimDelivery, SimEnv, sim_delivery::Faults};

/// Messenger as wired up inside a simulation.
pub type SimMessenger = Messenger<Arc<dyn SessionStore>, Arc<MemoryDirectory>, SimEnv>;

/// In-flight manipulation by a hostile relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tamper {
    /// Flip one bit of the ciphertext
    FlipCiphertext,
    /// Raise the sequence number to skip ahead
    BumpSequence,
    /// Report a different sender than the one who signed
    Misattribute(String),
    /// Drop the initiation material from first messages
    StripInitiation,
}

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `from` sends a text message to `to`
    Send {
        /// Sender
        from: String,
        /// Recipient
        to: String,
        /// Plaintext
        text: Vec<u8>,
    },
    /// `from` sends a file to `to`
    SendFile {
        /// Sender
        from: String,
        /// Recipient
        to: String,
        /// File contents
        contents: Vec<u8>,
    },
    /// Drain and process `to`'s mailbox
    Deliver(String),
    /// Drain every mailbox until the relay is empty
    DeliverAll,
    /// Move the shared clock forward
    Advance(Duration),
    /// `party` evicts expired sessions
    Evict(String),
    /// The relay re-queues every envelope it ever carried to `to`
    ReplayHistory(String),
    /// Take the relay offline (`false`) or back online
    RelayOnline(bool),
    /// The relay rewrites what is queued for `to`
    Tamper {
        /// Recipient whose mailbox is rewritten
        to: String,
        /// Manipulation to apply
        kind: Tamper,
    },
}

/// World state containing all parties and their observations.
pub struct World {
    env: SimEnv,
    relay: Arc<SimDelivery>,
    directory: Arc<MemoryDirectory>,
    parties: BTreeMap<String, SimMessenger>,
    sent: BTreeMap<(String, String), Vec<Vec<u8>>>,
    received: BTreeMap<String, Vec<Received>>,
    rejected: BTreeMap<String, Vec<SessionError>>,
    send_errors: Vec<(String, SessionError)>,
}

impl World {
    /// Create an empty world.
    pub fn new(seed: u64, faults: Faults) -> Self {
        Self {
            env: SimEnv::with_seed(seed),
            relay: Arc::new(SimDelivery::with_faults(seed.wrapping_add(1), faults)),
            directory: Arc::new(MemoryDirectory::new()),
            parties: BTreeMap::new(),
            sent: BTreeMap::new(),
            received: BTreeMap::new(),
            rejected: BTreeMap::new(),
            send_errors: Vec::new(),
        }
    }

    /// Create a party with a fresh identity and publish it.
    pub fn add_party(
        &mut self,
        name: &str,
        store: Arc<dyn SessionStore>,
        config: ProtocolConfig,
    ) -> Result<(), String> {
        let id = party_id(name)?;
        let identity = IdentityKeyPair::generate(&mut EnvRng::new(&self.env));
        let messenger =
            Messenger::new(id.clone(), identity, store, self.directory.clone(), self.env.clone())
                .with_config(config);

        self.directory.publish(id, &messenger.public_identity());
        self.parties.insert(name.to_string(), messenger);
        Ok(())
    }

    /// Execute one step.
    pub fn apply(&mut self, step: &Step) -> Result<(), String> {
        match step {
            Step::Send { from, to, text } => self.send(from, to, text, false),
            Step::SendFile { from, to, contents } => self.send(from, to, contents, true),
            Step::Deliver(to) => self.deliver(to),
            Step::DeliverAll => {
                while self.relay.pending_count() > 0 {
                    let names: Vec<String> = self.parties.keys().cloned().collect();
                    for name in names {
                        self.deliver(&name)?;
                    }
                }
                Ok(())
            },
            Step::Advance(by) => {
                self.env.advance(*by);
                Ok(())
            },
            Step::Evict(name) => {
                self.messenger(name)?
                    .evict_expired_sessions()
                    .map(|_| ())
                    .map_err(|e| format!("{name} evict failed: {e}"))
            },
            Step::ReplayHistory(to) => {
                let to_id = party_id(to)?;
                for (recipient, delivered) in self.relay.history() {
                    if recipient == to_id {
                        self.relay.inject(&recipient, &delivered.from, delivered.envelope);
                    }
                }
                Ok(())
            },
            Step::RelayOnline(online) => {
                self.relay.set_online(*online);
                Ok(())
            },
            Step::Tamper { to, kind } => {
                let to_id = party_id(to)?;
                let misattributed = match kind {
                    Tamper::Misattribute(name) => Some(party_id(name)?),
                    _ => None,
                };
                self.relay.tamper(&to_id, |delivered| match kind {
                    Tamper::FlipCiphertext => {
                        if let Some(byte) = delivered.envelope.ciphertext.first_mut() {
                            *byte ^= 0x01;
                        }
                    },
                    Tamper::BumpSequence => delivered.envelope.sequence_number += 1_000,
                    Tamper::Misattribute(_) => {
                        if let Some(id) = &misattributed {
                            delivered.from = id.clone();
                        }
                    },
                    Tamper::StripInitiation => {
                        delivered.envelope.ephemeral_public_key = None;
                        delivered.envelope.header_bytes = None;
                    },
                });
                Ok(())
            },
        }
    }

    fn send(&mut self, from: &str, to: &str, body: &[u8], file: bool) -> Result<(), String> {
        let to_id = party_id(to)?;
        let messenger = self.messenger(from)?;
        let result = if file {
            messenger.send_file(self.relay.as_ref(), &to_id, body)
        } else {
            messenger.send_message(self.relay.as_ref(), &to_id, body)
        };

        match result {
            Ok(_) => {
                let key = (from.to_string(), to.to_string());
                self.sent.entry(key).or_default().push(body.to_vec());
            },
            Err(err) => self.send_errors.push((from.to_string(), err)),
        }
        Ok(())
    }

    fn deliver(&mut self, to: &str) -> Result<(), String> {
        let to_id = party_id(to)?;
        let messenger = self.messenger(to)?;

        let mut accepted = Vec::new();
        let mut refused = Vec::new();
        for delivered in self.relay.drain_for(&to_id) {
            match messenger.handle_envelope(&delivered.from, &delivered.envelope) {
                Ok(received) => accepted.push(received),
                Err(err) => refused.push(err),
            }
        }

        self.received.entry(to.to_string()).or_default().extend(accepted);
        self.rejected.entry(to.to_string()).or_default().extend(refused);
        Ok(())
    }

    fn messenger(&self, name: &str) -> Result<&SimMessenger, String> {
        self.parties.get(name).ok_or_else(|| format!("party {name} not in scenario"))
    }

    /// Get a party's messenger by name.
    pub fn party(&self, name: &str) -> Option<&SimMessenger> {
        self.parties.get(name)
    }

    /// Names of every party.
    pub fn party_names(&self) -> Vec<String> {
        self.parties.keys().cloned().collect()
    }

    /// Plaintexts `from` successfully sent to `to`, in send order.
    pub fn sent(&self, from: &str, to: &str) -> &[Vec<u8>] {
        self.sent.get(&(from.to_string(), to.to_string())).map_or(&[], Vec::as_slice)
    }

    /// Messages `name` accepted, in acceptance order.
    pub fn received(&self, name: &str) -> &[Received] {
        self.received.get(name).map_or(&[], Vec::as_slice)
    }

    /// Envelopes `name` rejected.
    pub fn rejected(&self, name: &str) -> &[SessionError] {
        self.rejected.get(name).map_or(&[], Vec::as_slice)
    }

    /// Sends that failed before reaching the relay.
    pub fn send_errors(&self) -> &[(String, SessionError)] {
        &self.send_errors
    }

    /// Shared relay.
    pub fn relay(&self) -> &SimDelivery {
        &self.relay
    }

    /// Shared clock and RNG.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Total accepted across all parties.
    pub fn total_received(&self) -> usize {
        self.received.values().map(Vec::len).sum()
    }

    /// Total rejected across all parties.
    pub fn total_rejected(&self) -> usize {
        self.rejected.values().map(Vec::len).sum()
    }

    /// Total successfully sent across all parties.
    pub fn total_sent(&self) -> usize {
        self.sent.values().map(Vec::len).sum()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("env", &self.env)
            .field("parties", &self.parties.keys().collect::<Vec<_>>())
            .field("sent", &self.total_sent())
            .field("received", &self.total_received())
            .field("rejected", &self.total_rejected())
            .finish_non_exhaustive()
    }
}

fn party_id(name: &str) -> Result<PartyId, String> {
    PartyId::new(name).map_err(|e| format!("bad party name {name:?}: {e}"))
}
