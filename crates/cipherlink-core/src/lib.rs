//! Cipherlink protocol core logic
//!
//! Session establishment and message protection for end-to-end encrypted
//! direct messages, decoupled from I/O. The relay server only ever sees
//! [`Envelope`](cipherlink_proto::Envelope)s.
//!
//! # Architecture
//!
//! Protocol logic is synchronous and deterministic. Time and randomness come
//! from an [`Environment`](env::Environment); persistence goes through a
//! [`SessionStore`](storage::SessionStore); public keys come from a
//! [`KeyDirectory`](directory::KeyDirectory); outbound envelopes leave through
//! a [`DeliveryChannel`](delivery::DeliveryChannel). Production plugs in the
//! system clock, the OS RNG and a redb file; tests plug in a manual clock, a
//! seeded RNG and in-memory maps.
//!
//! The store is the only shared mutable state. Its sequence operations are
//! atomic, so two concurrent sends never draw the same sequence number and two
//! concurrent completions of one exchange converge on one session record.
//!
//! # Components
//!
//! - [`exchange`]: Authenticated exchange state machine (initiate, verify, commit)
//! - [`replay`]: Sequence-number replay guard
//! - [`storage`]: Session store trait, memory and redb implementations
//! - [`messenger`]: Per-party facade (seal, handle envelope, evict)
//! - [`directory`]: Public key directory seam
//! - [`delivery`]: Delivery channel seam
//! - [`mod@env`]: Environment abstraction (time, RNG)
//! - [`config`]: Protocol limits
//! - [`error`]: Session and storage error types

pub mod config;
pub mod delivery;
pub mod directory;
pub mod env;
pub mod error;
pub mod exchange;
pub mod messenger;
pub mod replay;
pub mod storage;

pub use config::ProtocolConfig;
pub use delivery::DeliveryChannel;
pub use directory::{KeyDirectory, MemoryDirectory};
pub use env::{EnvRng, Environment, SystemEnv};
pub use error::{SessionError, StorageError};
pub use exchange::{CompletedExchange, Exchange, ExchangeResult, ExchangeState};
pub use messenger::{Content, Messenger, Received};
pub use replay::ReplayGuard;
pub use storage::{MemoryStore, PendingInitiation, RedbStore, SessionRecord, SessionStore};

/// `tracing` target for security-relevant events.
///
/// Signature failures, tag mismatches, stale or replayed messages are logged
/// under this target so an audit subscriber can route them separately.
pub const AUDIT_TARGET: &str = "cipherlink::audit";
