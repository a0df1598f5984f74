//! Reusable oracles.

use std::collections::BTreeMap;

use cipherlink_core::{SessionError, SessionStore};

use crate::scenario::{OracleFn, World};

/// Run every oracle, failing on the first error.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |world: &World| oracles.into_iter().try_for_each(|oracle| oracle(world)))
}

/// No envelope was rejected and no send failed.
pub fn no_rejections() -> OracleFn {
    Box::new(|world: &World| {
        for name in world.party_names() {
            if let Some(err) = world.rejected(&name).first() {
                return Err(format!("{name} rejected an envelope: {err}"));
            }
        }
        match world.send_errors().first() {
            Some((name, err)) => Err(format!("{name} failed to send: {err}")),
            None => Ok(()),
        }
    })
}

/// Every recipient accepted exactly what each sender sent, in send order.
pub fn inboxes_match_sent() -> OracleFn {
    Box::new(|world: &World| {
        for to in world.party_names() {
            let mut by_sender: BTreeMap<String, Vec<&[u8]>> = BTreeMap::new();
            for received in world.received(&to) {
                by_sender
                    .entry(received.from.to_string())
                    .or_default()
                    .push(received.content.as_bytes());
            }

            for from in world.party_names() {
                let expected: Vec<&[u8]> =
                    world.sent(&from, &to).iter().map(Vec::as_slice).collect();
                let actual = by_sender.remove(&from).unwrap_or_default();
                if actual != expected {
                    return Err(format!(
                        "{to} accepted {} messages from {from}, expected {}",
                        actual.len(),
                        expected.len()
                    ));
                }
            }
        }
        Ok(())
    })
}

/// Accepted sequence numbers strictly increase per (recipient, sender), so
/// no envelope was ever accepted twice.
pub fn sequences_strictly_increase() -> OracleFn {
    Box::new(|world: &World| {
        for to in world.party_names() {
            let mut last: BTreeMap<String, u64> = BTreeMap::new();
            for received in world.received(&to) {
                let previous = last.insert(received.from.to_string(), received.sequence_number);
                if previous.is_some_and(|p| p >= received.sequence_number) {
                    return Err(format!(
                        "{to} accepted sequence {} from {} after {previous:?}",
                        received.sequence_number, received.from
                    ));
                }
            }
        }
        Ok(())
    })
}

/// Everything accepted was actually sent by the claimed sender.
pub fn accepted_messages_were_sent() -> OracleFn {
    Box::new(|world: &World| {
        for to in world.party_names() {
            for received in world.received(&to) {
                let sent = world.sent(received.from.as_str(), &to);
                if !sent.iter().any(|body| body.as_slice() == received.content.as_bytes()) {
                    return Err(format!("{to} accepted a message {} never sent", received.from));
                }
            }
        }
        Ok(())
    })
}

/// Every rejection at `party` satisfies `check`, and there is at least one.
pub fn rejected_with(party: &str, check: fn(&SessionError) -> bool) -> OracleFn {
    let party = party.to_string();
    Box::new(move |world: &World| {
        let rejected = world.rejected(&party);
        if rejected.is_empty() {
            return Err(format!("{party} rejected nothing"));
        }
        match rejected.iter().find(|err| !check(err)) {
            Some(err) => Err(format!("{party} rejected with unexpected error: {err}")),
            None => Ok(()),
        }
    })
}

/// `party` accepted exactly `count` messages.
pub fn received_count(party: &str, count: usize) -> OracleFn {
    let party = party.to_string();
    Box::new(move |world: &World| {
        let actual = world.received(&party).len();
        if actual == count {
            Ok(())
        } else {
            Err(format!("{party} accepted {actual} messages, expected {count}"))
        }
    })
}

/// Both parties hold the same key for every session they share.
pub fn session_keys_agree(a: &str, b: &str) -> OracleFn {
    let (a, b) = (a.to_string(), b.to_string());
    Box::new(move |world: &World| {
        let (Some(left), Some(right)) = (world.party(&a), world.party(&b)) else {
            return Err(format!("{a} or {b} not in scenario"));
        };

        for received in world.received(&b).iter().filter(|r| r.from.as_str() == a) {
            let session = &received.session_id;
            let ours = left.store().get_session(session).map_err(|e| e.to_string())?;
            let theirs = right.store().get_session(session).map_err(|e| e.to_string())?;
            match (ours, theirs) {
                (Some(x), Some(y)) if x.key == y.key => {},
                _ => return Err(format!("session {session} differs between {a} and {b}")),
            }
        }
        Ok(())
    })
}
