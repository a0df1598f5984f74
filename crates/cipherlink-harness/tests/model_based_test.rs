//! Model-based property tests.
//!
//! These tests generate random operation sequences and verify that the real
//! implementation behaves identically to the reference model.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!      ModelWorld    RealWorld      Compare
//!      (reference)   (messengers)   Results
//! ```

use std::{sync::Arc, time::Duration};

use arbitrary::{Arbitrary, Unstructured};
use cipherlink_core::{MemoryStore, ProtocolConfig};
use cipherlink_harness::{
    Faults, ModelWorld, Operation, OperationResult, SmallMessage,
    model::party_name,
    scenario::{Step, World},
};
use proptest::prelude::*;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Real system wrapper that mirrors ModelWorld's interface.
struct RealWorld {
    world: World,
}

impl RealWorld {
    fn new(num_parties: usize, seed: u64) -> Self {
        let mut world = World::new(seed, Faults::NONE);
        for index in 0..num_parties as u8 {
            let store = Arc::new(MemoryStore::new());
            world.add_party(&party_name(index), store, ProtocolConfig::default()).unwrap();
        }
        Self { world }
    }

    fn apply(&mut self, op: &Operation) -> OperationResult {
        match *op {
            Operation::Send { from, to, message } => {
                let before = self.world.relay().history().len();
                self.world
                    .apply(&Step::Send {
                        from: party_name(from),
                        to: party_name(to),
                        text: message.to_bytes(),
                    })
                    .unwrap();
                let history = self.world.relay().history();
                assert_eq!(history.len(), before + 1, "send did not reach the relay");
                OperationResult::Sent { sequence: history[before].1.envelope.sequence_number }
            },
            Operation::Deliver { to } => {
                let name = party_name(to);
                let (accepted, rejected) =
                    (self.world.received(&name).len(), self.world.rejected(&name).len());
                self.world.apply(&Step::Deliver(name.clone())).unwrap();
                OperationResult::Delivered {
                    accepted: self.world.received(&name).len() - accepted,
                    rejected: self.world.rejected(&name).len() - rejected,
                }
            },
            Operation::ReplayHistory { to } => {
                self.world.apply(&Step::ReplayHistory(party_name(to))).unwrap();
                OperationResult::Ok
            },
            Operation::AdvanceTime { millis } => {
                self.world.apply(&Step::Advance(Duration::from_millis(u64::from(millis)))).unwrap();
                OperationResult::Ok
            },
        }
    }
}

/// Strategy for generating SmallMessage.
fn small_message_strategy() -> impl Strategy<Value = SmallMessage> {
    (any::<u8>(), any::<u8>()).prop_map(|(seed, size_class)| SmallMessage { seed, size_class })
}

/// Strategy for generating operations; indices are normalized per test.
fn operation_strategy() -> impl Strategy<Value = Operation> {
    let party = 0..8u8;

    prop_oneof![
        // Weight towards sends so mailboxes fill up
        5 => (party.clone(), party.clone(), small_message_strategy())
            .prop_map(|(from, to, message)| Operation::Send { from, to, message }),
        3 => party.clone().prop_map(|to| Operation::Deliver { to }),
        1 => party.prop_map(|to| Operation::ReplayHistory { to }),
        1 => any::<u16>().prop_map(|millis| Operation::AdvanceTime { millis }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Verify that operation results match between model and real implementation.
    #[test]
    fn prop_model_matches_real(
        seed in any::<u64>(),
        num_parties in 2..5usize,
        ops in prop::collection::vec(operation_strategy(), 0..40)
    ) {
        let mut model = ModelWorld::new();
        let mut real = RealWorld::new(num_parties, seed);

        for (i, op) in ops.into_iter().enumerate() {
            let op = op.normalized(num_parties);

            let model_result = model.apply(&op);
            let real_result = real.apply(&op);

            prop_assert_eq!(
                model_result, real_result,
                "Divergence at operation {}: {:?}", i, op
            );
        }
    }

    /// Draining everything after any history leaves nothing pending and
    /// accepts every envelope exactly once.
    #[test]
    fn prop_everything_eventually_delivered_once(
        seed in any::<u64>(),
        ops in prop::collection::vec(operation_strategy(), 0..40)
    ) {
        let mut real = RealWorld::new(3, seed);
        for op in ops {
            real.apply(&op.normalized(3));
        }
        real.world.apply(&Step::DeliverAll).unwrap();

        prop_assert_eq!(real.world.relay().pending_count(), 0);
        prop_assert!(real.world.send_errors().is_empty());
        prop_assert_eq!(real.world.total_received(), real.world.total_sent());
    }
}

/// Operation streams decoded from raw bytes, the way a fuzzer would feed
/// them.
#[test]
fn arbitrary_operation_streams_agree_with_model() {
    let mut rng = ChaCha20Rng::seed_from_u64(0x5eed);

    for round in 0..16u64 {
        let mut raw = vec![0u8; 512];
        rng.fill_bytes(&mut raw);
        let mut input = Unstructured::new(&raw);

        let mut model = ModelWorld::new();
        let mut real = RealWorld::new(3, round);

        while let Ok(op) = Operation::arbitrary(&mut input) {
            let op = match op.normalized(3) {
                // Bound elapsed time well under the message age limit
                Operation::AdvanceTime { millis } => {
                    Operation::AdvanceTime { millis: millis % 1_000 }
                },
                other => other,
            };
            assert_eq!(model.apply(&op), real.apply(&op), "round {round}: {op:?}");
            if input.is_empty() {
                break;
            }
        }
    }
}
