//! Deterministic simulation harness for Cipherlink protocol testing.
//!
//! Simulated implementations of the Environment and DeliveryChannel traits
//! for reproducible testing under duplication, reordering and a hostile
//! relay, plus a scenario framework and a reference model.

pub mod model;
pub mod scenario;
pub mod sim_delivery;
pub mod sim_env;

pub use model::{ModelWorld, Operation, OperationResult, PartyIndex, SmallMessage};
pub use sim_delivery::{Delivered, Faults, RelayOffline, SimDelivery};
pub use sim_env::SimEnv;
