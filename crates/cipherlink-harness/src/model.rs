//! Reference model for model-based testing.
//!
//! Reduces the protocol to what an observer should see: per (sender,
//! recipient) send counters, FIFO mailboxes, and a last-accepted sequence per
//! (recipient, sender). An envelope is accepted exactly when its sequence
//! number beats the last one accepted from that sender. The real system,
//! with all of its signatures, key derivation and AEAD, must agree.

use std::collections::{BTreeMap, HashMap};

use arbitrary::Arbitrary;

/// Index of a party in the model (`p0`, `p1`, ...).
pub type PartyIndex = u8;

/// A message body small enough to keep test cases readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct SmallMessage {
    /// Byte value to repeat
    pub seed: u8,
    /// Selects the length
    pub size_class: u8,
}

impl SmallMessage {
    /// Expand into plaintext bytes.
    pub fn to_bytes(self) -> Vec<u8> {
        let len = match self.size_class % 4 {
            0 => 0,
            1 => 1,
            2 => 64,
            _ => 1024,
        };
        vec![self.seed; len]
    }
}

/// Operations applied to both model and real world.
#[derive(Debug, Clone, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// `from` sends a message to `to`
    Send {
        /// Sender
        from: PartyIndex,
        /// Recipient
        to: PartyIndex,
        /// Body
        message: SmallMessage,
    },
    /// `to` processes its mailbox
    Deliver {
        /// Recipient
        to: PartyIndex,
    },
    /// The relay re-queues everything it ever carried to `to`
    ReplayHistory {
        /// Recipient
        to: PartyIndex,
    },
    /// Time passes
    AdvanceTime {
        /// Milliseconds
        millis: u16,
    },
}

impl Operation {
    /// Map party indices into `0..num_parties` with sender and recipient
    /// always distinct. `num_parties` must be at least 2.
    #[must_use]
    pub fn normalized(self, num_parties: usize) -> Self {
        let n = num_parties.clamp(2, usize::from(u8::MAX)) as u8;
        match self {
            Self::Send { from, to, message } => {
                let from = from % n;
                let to = ((u16::from(from) + 1 + u16::from(to % (n - 1))) % u16::from(n)) as u8;
                Self::Send { from, to, message }
            },
            Self::Deliver { to } => Self::Deliver { to: to % n },
            Self::ReplayHistory { to } => Self::ReplayHistory { to: to % n },
            Self::AdvanceTime { millis } => Self::AdvanceTime { millis },
        }
    }
}

/// Observable outcome of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// Message handed to the relay with this sequence number
    Sent {
        /// Sequence number assigned
        sequence: u64,
    },
    /// Mailbox processed
    Delivered {
        /// Envelopes accepted
        accepted: usize,
        /// Envelopes rejected
        rejected: usize,
    },
    /// Nothing observable
    Ok,
}

/// Reference implementation.
#[derive(Debug, Default)]
pub struct ModelWorld {
    next_send: HashMap<(PartyIndex, PartyIndex), u64>,
    last_accepted: HashMap<(PartyIndex, PartyIndex), u64>,
    mailboxes: BTreeMap<PartyIndex, Vec<(PartyIndex, u64)>>,
    history: Vec<(PartyIndex, PartyIndex, u64)>,
    now_ms: u64,
}

impl ModelWorld {
    /// Empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a normalized operation.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match *op {
            Operation::Send { from, to, .. } => {
                let counter = self.next_send.entry((from, to)).or_insert(0);
                *counter += 1;
                let sequence = *counter;
                self.mailboxes.entry(to).or_default().push((from, sequence));
                self.history.push((to, from, sequence));
                OperationResult::Sent { sequence }
            },
            Operation::Deliver { to } => {
                let (mut accepted, mut rejected) = (0, 0);
                for (from, sequence) in self.mailboxes.remove(&to).unwrap_or_default() {
                    let last = self.last_accepted.entry((to, from)).or_insert(0);
                    if sequence > *last {
                        *last = sequence;
                        accepted += 1;
                    } else {
                        rejected += 1;
                    }
                }
                OperationResult::Delivered { accepted, rejected }
            },
            Operation::ReplayHistory { to } => {
                let replays: Vec<(PartyIndex, u64)> = self
                    .history
                    .iter()
                    .filter(|(recipient, ..)| *recipient == to)
                    .map(|&(_, from, sequence)| (from, sequence))
                    .collect();
                self.mailboxes.entry(to).or_default().extend(replays);
                OperationResult::Ok
            },
            Operation::AdvanceTime { millis } => {
                self.now_ms += u64::from(millis);
                OperationResult::Ok
            },
        }
    }

    /// Last sequence `to` accepted from `from`.
    pub fn last_accepted(&self, to: PartyIndex, from: PartyIndex) -> u64 {
        self.last_accepted.get(&(to, from)).copied().unwrap_or(0)
    }

    /// Envelopes queued and not yet delivered.
    pub fn pending(&self) -> usize {
        self.mailboxes.values().map(Vec::len).sum()
    }

    /// Simulated time elapsed.
    pub fn elapsed_ms(&self) -> u64 {
        self.now_ms
    }
}

/// Scenario name for a model party.
pub fn party_name(index: PartyIndex) -> String {
    format!("p{index}")
}
