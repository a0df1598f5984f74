//! Simulated relay.
//!
//! Models the only guarantees the protocol relies on: every envelope is
//! delivered at least once, in no particular order. Duplication and
//! reordering are driven by a seeded RNG so runs are reproducible.
//!
//! The relay is also the adversary. Tests can inject, replay or rewrite
//! envelopes in flight.

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use cipherlink_core::DeliveryChannel;
use cipherlink_proto::{Envelope, PartyId};
use rand::{Rng, SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha20Rng;

/// Delivery fault settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Faults {
    /// Chance, in percent, that an envelope is delivered twice
    pub duplicate_percent: u8,
    /// Shuffle each drained batch
    pub reorder: bool,
}

impl Faults {
    /// In order, exactly once.
    pub const NONE: Self = Self { duplicate_percent: 0, reorder: false };
}

impl Default for Faults {
    fn default() -> Self {
        Self::NONE
    }
}

/// An envelope as handed to the recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    /// Sender as reported by the relay
    pub from: PartyId,
    /// The envelope
    pub envelope: Envelope,
}

/// Relay refused the envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("relay offline")]
pub struct RelayOffline;

struct State {
    rng: ChaCha20Rng,
    faults: Faults,
    online: bool,
    queues: BTreeMap<PartyId, Vec<Delivered>>,
    history: Vec<(PartyId, Delivered)>,
    duplicated: usize,
}

/// In-memory relay with seeded faults.
pub struct SimDelivery {
    state: Mutex<State>,
}

impl SimDelivery {
    /// Reliable in-order relay.
    pub fn new(seed: u64) -> Self {
        Self::with_faults(seed, Faults::NONE)
    }

    /// Relay that applies `faults` when draining.
    pub fn with_faults(seed: u64, faults: Faults) -> Self {
        Self {
            state: Mutex::new(State {
                rng: ChaCha20Rng::seed_from_u64(seed),
                faults,
                online: true,
                queues: BTreeMap::new(),
                history: Vec::new(),
                duplicated: 0,
            }),
        }
    }

    /// Take everything queued for `to`, applying duplication and reordering.
    pub fn drain_for(&self, to: &PartyId) -> Vec<Delivered> {
        let mut state = self.lock();
        let State { rng, faults, queues, duplicated, .. } = &mut *state;

        let queued = queues.remove(to).unwrap_or_default();
        let mut batch = Vec::with_capacity(queued.len());
        for item in queued {
            if faults.duplicate_percent > 0 && rng.gen_range(0..100u8) < faults.duplicate_percent {
                batch.push(item.clone());
                *duplicated += 1;
            }
            batch.push(item);
        }
        if faults.reorder {
            batch.shuffle(rng);
        }

        tracing::trace!(%to, count = batch.len(), "drained mailbox");
        batch
    }

    /// Queue an envelope as if `from` had sent it.
    pub fn inject(&self, to: &PartyId, from: &PartyId, envelope: Envelope) {
        self.lock()
            .queues
            .entry(to.clone())
            .or_default()
            .push(Delivered { from: from.clone(), envelope });
    }

    /// Rewrite every envelope currently queued for `to`.
    pub fn tamper(&self, to: &PartyId, mut rewrite: impl FnMut(&mut Delivered)) {
        if let Some(queue) = self.lock().queues.get_mut(to) {
            queue.iter_mut().for_each(&mut rewrite);
        }
    }

    /// Every envelope ever accepted for delivery, with its recipient.
    pub fn history(&self) -> Vec<(PartyId, Delivered)> {
        self.lock().history.clone()
    }

    /// Envelopes queued and not yet drained, across all recipients.
    pub fn pending_count(&self) -> usize {
        self.lock().queues.values().map(Vec::len).sum()
    }

    /// Extra copies produced by duplication so far.
    pub fn duplicated_count(&self) -> usize {
        self.lock().duplicated
    }

    /// Take the relay offline or bring it back.
    pub fn set_online(&self, online: bool) {
        self.lock().online = online;
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeliveryChannel for SimDelivery {
    type Error = RelayOffline;

    fn send(&self, to: &PartyId, from: &PartyId, envelope: Envelope) -> Result<(), RelayOffline> {
        let mut state = self.lock();
        if !state.online {
            return Err(RelayOffline);
        }

        let delivered = Delivered { from: from.clone(), envelope };
        state.history.push((to.clone(), delivered.clone()));
        state.queues.entry(to.clone()).or_default().push(delivered);
        Ok(())
    }
}

impl std::fmt::Debug for SimDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("SimDelivery")
            .field("faults", &state.faults)
            .field("online", &state.online)
            .field("pending", &state.queues.values().map(Vec::len).sum::<usize>())
            .finish_non_exhaustive()
    }
}
