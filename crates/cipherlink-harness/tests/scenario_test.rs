//! End-to-end scenarios over the simulated relay.

use std::{sync::Arc, time::Duration};

use cipherlink_core::{ProtocolConfig, RedbStore, SessionError};
use cipherlink_harness::{
    Faults,
    scenario::{Scenario, Tamper, World, oracle},
};

#[test]
fn two_parties_converse() {
    let report = Scenario::new("conversation")
        .seed(1)
        .party("alice")
        .party("bob")
        .send("alice", "bob", b"hi bob")
        .deliver("bob")
        .send("bob", "alice", b"hi alice")
        .send("bob", "alice", b"how are you")
        .deliver("alice")
        .send("alice", "bob", b"fine")
        .send_file("alice", "bob", &[7u8; 2048])
        .deliver_all()
        .oracle(oracle::all_of(vec![
            oracle::no_rejections(),
            oracle::inboxes_match_sent(),
            oracle::session_keys_agree("alice", "bob"),
        ]))
        .run()
        .unwrap();

    assert_eq!(report.sent, 5);
    assert_eq!(report.accepted, 5);
}

#[test]
fn simultaneous_first_messages_open_two_sessions() {
    Scenario::new("crossing initiations")
        .seed(2)
        .party("alice")
        .party("bob")
        .send("alice", "bob", b"a1")
        .send("bob", "alice", b"b1")
        .deliver_all()
        .send("alice", "bob", b"a2")
        .send("bob", "alice", b"b2")
        .deliver_all()
        .oracle(oracle::all_of(vec![oracle::no_rejections(), oracle::inboxes_match_sent()]))
        .run()
        .unwrap();
}

#[test]
fn relay_replay_is_rejected() {
    let report = Scenario::new("replay attack")
        .seed(3)
        .party("alice")
        .party("bob")
        .send("alice", "bob", b"transfer 10")
        .send("alice", "bob", b"transfer 20")
        .deliver("bob")
        .replay_history("bob")
        .deliver("bob")
        .oracle(oracle::all_of(vec![
            oracle::received_count("bob", 2),
            oracle::rejected_with("bob", |e| matches!(e, SessionError::ReplayRejected { .. })),
            oracle::sequences_strictly_increase(),
        ]))
        .run()
        .unwrap();

    assert_eq!(report.rejected, 2);
}

#[test]
fn duplicating_reordering_relay_never_double_delivers() {
    let mut scenario = Scenario::new("lossy relay")
        .seed(4)
        .faults(Faults { duplicate_percent: 40, reorder: true })
        .party("alice")
        .party("bob")
        .party("carol")
        .send("alice", "bob", b"open")
        .send("carol", "bob", b"open")
        .deliver_all();

    for i in 0..30u8 {
        scenario = scenario.send("alice", "bob", &[i]).send("carol", "bob", &[i, i]);
    }

    let report = scenario
        .deliver_all()
        .oracle(oracle::all_of(vec![
            oracle::sequences_strictly_increase(),
            oracle::accepted_messages_were_sent(),
        ]))
        .run()
        .unwrap();

    assert!(report.duplicated > 0);
    assert!(report.accepted <= report.sent);
    assert_eq!(report.accepted + report.rejected, report.sent + report.duplicated);
}

#[test]
fn tampered_ciphertext_is_rejected() {
    Scenario::new("bit flip")
        .seed(5)
        .party("alice")
        .party("bob")
        .send("alice", "bob", b"hello")
        .tamper("bob", Tamper::FlipCiphertext)
        .deliver("bob")
        .oracle(oracle::all_of(vec![
            oracle::received_count("bob", 0),
            oracle::rejected_with("bob", |e| *e == SessionError::InvalidSignature),
        ]))
        .run()
        .unwrap();
}

#[test]
fn skipped_sequence_is_caught_by_signature() {
    Scenario::new("sequence bump")
        .seed(6)
        .party("alice")
        .party("bob")
        .send("alice", "bob", b"hello")
        .tamper("bob", Tamper::BumpSequence)
        .deliver("bob")
        .oracle(oracle::rejected_with("bob", |e| *e == SessionError::InvalidSignature))
        .run()
        .unwrap();
}

#[test]
fn misattributed_sender_is_rejected() {
    Scenario::new("impersonation")
        .seed(7)
        .party("alice")
        .party("bob")
        .party("mallory")
        .send("mallory", "bob", b"i am alice")
        .tamper("bob", Tamper::Misattribute("alice".into()))
        .deliver("bob")
        .oracle(oracle::all_of(vec![
            oracle::received_count("bob", 0),
            oracle::rejected_with("bob", SessionError::is_security_critical),
        ]))
        .run()
        .unwrap();
}

#[test]
fn stripped_initiation_leaves_no_session() {
    Scenario::new("stripped header")
        .seed(8)
        .party("alice")
        .party("bob")
        .send("alice", "bob", b"first")
        .tamper("bob", Tamper::StripInitiation)
        .deliver("bob")
        .oracle(oracle::rejected_with("bob", |e| *e == SessionError::InvalidSignature))
        .run()
        .unwrap();
}

#[test]
fn delayed_delivery_goes_stale() {
    Scenario::new("stale")
        .seed(9)
        .party("alice")
        .party("bob")
        .send("alice", "bob", b"now")
        .advance(Duration::from_secs(2 * 60 * 60))
        .deliver("bob")
        .oracle(oracle::rejected_with("bob", |e| matches!(e, SessionError::StaleMessage { .. })))
        .run()
        .unwrap();
}

#[test]
fn expired_session_is_renewed() {
    let config =
        ProtocolConfig { session_ttl: Duration::from_secs(60), ..ProtocolConfig::default() };

    Scenario::new("ttl")
        .seed(10)
        .config(config)
        .party("alice")
        .party("bob")
        .send("alice", "bob", b"before")
        .deliver("bob")
        .advance(Duration::from_secs(120))
        .evict("alice")
        .evict("bob")
        .send("alice", "bob", b"after")
        .deliver("bob")
        .oracle(oracle::all_of(vec![
            oracle::no_rejections(),
            oracle::inboxes_match_sent(),
            Box::new(|world: &World| {
                let bob = world.received("bob");
                if bob[0].session_id == bob[1].session_id {
                    return Err("session was not renewed".into());
                }
                Ok(())
            }),
        ]))
        .run()
        .unwrap();
}

#[test]
fn relay_outage_surfaces_as_send_error() {
    let report = Scenario::new("outage")
        .seed(11)
        .party("alice")
        .party("bob")
        .relay_online(false)
        .send("alice", "bob", b"lost")
        .relay_online(true)
        .send("alice", "bob", b"retried")
        .deliver_all()
        .oracle(oracle::all_of(vec![
            oracle::received_count("bob", 1),
            oracle::inboxes_match_sent(),
            Box::new(|world: &World| match world.send_errors() {
                [(name, SessionError::Delivery(_))] if name == "alice" => Ok(()),
                other => Err(format!("unexpected send errors: {other:?}")),
            }),
        ]))
        .run()
        .unwrap();

    assert_eq!(report.send_errors, 1);
    assert_eq!(report.rejected, 0);
}

#[test]
fn redb_backed_party_survives_the_same_script() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RedbStore::open(dir.path().join("bob.redb")).unwrap());

    Scenario::new("persistent bob")
        .seed(12)
        .party("alice")
        .party_with_store("bob", store.clone())
        .send("alice", "bob", b"one")
        .send("alice", "bob", b"two")
        .deliver_all()
        .replay_history("bob")
        .deliver_all()
        .oracle(oracle::all_of(vec![
            oracle::received_count("bob", 2),
            oracle::inboxes_match_sent(),
            oracle::session_keys_agree("alice", "bob"),
        ]))
        .run()
        .unwrap();
}
