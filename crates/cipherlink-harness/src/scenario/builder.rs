//! Scenario builder API.
//!
//! Provides a declarative API for constructing scenario tests that enforce
//! the Oracle Pattern.

use std::{fmt, sync::Arc, time::Duration};

use cipherlink_core::{MemoryStore, ProtocolConfig, SessionStore};

use crate::{
    scenario::{OracleFn, Step, Tamper, World},
    sim_delivery::Faults,
};

/// Scenario builder.
///
/// Add parties and steps, then call `.oracle()` to get a
/// [`RunnableScenario`].
pub struct Scenario {
    name: String,
    seed: u64,
    faults: Faults,
    config: ProtocolConfig,
    parties: Vec<(String, Option<Arc<dyn SessionStore>>)>,
    steps: Vec<Step>,
}

impl Scenario {
    /// Create a new scenario with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seed: 0,
            faults: Faults::NONE,
            config: ProtocolConfig::default(),
            parties: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Seed for identities, IVs and relay faults.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Relay misbehaviour.
    pub fn faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }

    /// Protocol configuration shared by every party.
    pub fn config(mut self, config: ProtocolConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a party with an in-memory store.
    pub fn party(mut self, name: impl Into<String>) -> Self {
        self.parties.push((name.into(), None));
        self
    }

    /// Add a party backed by `store`.
    pub fn party_with_store(
        mut self,
        name: impl Into<String>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        self.parties.push((name.into(), Some(store)));
        self
    }

    /// Append an arbitrary step.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// `from` sends `text` to `to`.
    pub fn send(self, from: &str, to: &str, text: &[u8]) -> Self {
        self.step(Step::Send { from: from.into(), to: to.into(), text: text.to_vec() })
    }

    /// `from` sends a file to `to`.
    pub fn send_file(self, from: &str, to: &str, contents: &[u8]) -> Self {
        self.step(Step::SendFile { from: from.into(), to: to.into(), contents: contents.to_vec() })
    }

    /// Process `to`'s mailbox.
    pub fn deliver(self, to: &str) -> Self {
        self.step(Step::Deliver(to.into()))
    }

    /// Process every mailbox until the relay is empty.
    pub fn deliver_all(self) -> Self {
        self.step(Step::DeliverAll)
    }

    /// Move the clock forward.
    pub fn advance(self, by: Duration) -> Self {
        self.step(Step::Advance(by))
    }

    /// `party` evicts its expired sessions.
    pub fn evict(self, party: &str) -> Self {
        self.step(Step::Evict(party.into()))
    }

    /// The relay replays everything it ever carried to `to`.
    pub fn replay_history(self, to: &str) -> Self {
        self.step(Step::ReplayHistory(to.into()))
    }

    /// Take the relay offline or bring it back.
    pub fn relay_online(self, online: bool) -> Self {
        self.step(Step::RelayOnline(online))
    }

    /// The relay rewrites what is queued for `to`.
    pub fn tamper(self, to: &str, kind: Tamper) -> Self {
        self.step(Step::Tamper { to: to.into(), kind })
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory - you cannot run a scenario without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

/// Counts from a finished scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Scenario name
    pub name: String,
    /// Messages handed to the relay
    pub sent: usize,
    /// Envelopes accepted by recipients
    pub accepted: usize,
    /// Envelopes rejected by recipients
    pub rejected: usize,
    /// Extra copies the relay produced
    pub duplicated: usize,
    /// Sends that failed before reaching the relay
    pub send_errors: usize,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: sent={} accepted={} rejected={} duplicated={} send_errors={}",
            self.name, self.sent, self.accepted, self.rejected, self.duplicated, self.send_errors
        )
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Execute the scenario.
    ///
    /// Creates and publishes every party, runs the steps in order, then
    /// invokes the oracle on the final world.
    pub fn run(self) -> Result<Report, String> {
        let Scenario { name, seed, faults, config, parties, steps } = self.scenario;
        let mut world = World::new(seed, faults);

        for (party, store) in parties {
            let store = store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
            world
                .add_party(&party, store, config.clone())
                .map_err(|e| format!("Scenario '{name}': {e}"))?;
        }

        for (index, step) in steps.iter().enumerate() {
            tracing::debug!(scenario = %name, index, ?step, "applying step");
            world.apply(step).map_err(|e| format!("Scenario '{name}' step {index}: {e}"))?;
        }

        let report = Report {
            name: name.clone(),
            sent: world.total_sent(),
            accepted: world.total_received(),
            rejected: world.total_rejected(),
            duplicated: world.relay().duplicated_count(),
            send_errors: world.send_errors().len(),
        };

        (self.oracle)(&world).map_err(|e| format!("Scenario '{name}' oracle: {e}"))?;
        Ok(report)
    }
}
