//! Delivery channel abstraction.
//!
//! Abstracts over the relay that moves envelopes between parties. Production
//! would publish to a pub/sub channel keyed by recipient; tests use an
//! in-memory mailbox that duplicates and reorders.
//!
//! The protocol assumes only at-least-once, unordered delivery. Duplicates
//! and reordering are handled by the replay guard on the receiving side, and
//! nothing about decryption success flows back through the channel.

use std::{error::Error, sync::Arc};

use cipherlink_proto::{Envelope, PartyId};

/// Outbound side of the relay.
pub trait DeliveryChannel: Send + Sync {
    /// Transport-specific failure.
    type Error: Error + Send + Sync + 'static;

    /// Hand `envelope` to the relay for delivery to `to`.
    ///
    /// `from` is the authenticated sender as the relay knows it. The relay
    /// passes it to the recipient alongside the envelope.
    fn send(&self, to: &PartyId, from: &PartyId, envelope: Envelope) -> Result<(), Self::Error>;
}

impl<T: DeliveryChannel + ?Sized> DeliveryChannel for Arc<T> {
    type Error = T::Error;

    fn send(&self, to: &PartyId, from: &PartyId, envelope: Envelope) -> Result<(), Self::Error> {
        (**self).send(to, from, envelope)
    }
}
