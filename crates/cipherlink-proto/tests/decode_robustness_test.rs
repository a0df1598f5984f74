//! Decoding arbitrary bytes must fail cleanly, never panic.

use cipherlink_proto::{Envelope, ExchangeHeader, SignedHeader};
use proptest::prelude::*;

proptest! {
    #[test]
    fn envelope_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = Envelope::decode(&bytes);
    }

    #[test]
    fn header_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = ExchangeHeader::from_bytes(&bytes);
        let _ = SignedHeader::from_bytes(&bytes);
    }

    #[test]
    fn truncated_envelope_is_rejected(cut in 1usize..40) {
        let envelope = Envelope {
            ciphertext: vec![0x42; 24],
            iv: vec![0x24; 12],
            session_id: cipherlink_proto::SessionId::from_bytes([3; 16]),
            ephemeral_public_key: None,
            header_bytes: None,
            signature: vec![0x55; 64],
            sequence_number: 7,
        };
        let bytes = envelope.encode().unwrap();
        let cut = cut.min(bytes.len());
        prop_assert!(Envelope::decode(&bytes[..bytes.len() - cut]).is_err());
    }
}
