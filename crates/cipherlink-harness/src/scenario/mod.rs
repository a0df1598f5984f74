//! Scenario framework.
//!
//! A scenario declares parties and a script of steps (send, deliver, advance
//! time, attack the relay), then must be given an oracle that inspects the
//! final [`World`]. There is no way to run a scenario without one.
//!
//! ```text
//! Scenario::new("name")
//!     .party("alice").party("bob")
//!     .send("alice", "bob", b"hi")
//!     .deliver_all()
//!     .oracle(oracle::all_of(vec![...]))
//!     .run()
//! ```

mod builder;
pub mod oracle;
mod world;

pub use builder::{Report, RunnableScenario, Scenario};
pub use world::{SimMessenger, Step, Tamper, World};

/// Verifies the final state of a scenario.
pub type OracleFn = Box<dyn FnOnce(&World) -> Result<(), String>>;
