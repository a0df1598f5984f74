//! Message and file encryption under a session key.
//!
//! AES-256-GCM with a random 96-bit IV per call and a 128-bit tag. The
//! plaintext is framed by [`Payload`] so it carries the sender timestamp;
//! after authentication the receiver applies a [`FreshnessPolicy`].
//!
//! Tag failure is reported as [`CryptoError::AuthenticationFailed`] and
//! never yields partial plaintext.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use rand::{CryptoRng, RngCore};

use crate::{error::CryptoError, kdf::SessionKey, payload::Payload};

/// AES-GCM nonce length in bytes.
pub const IV_LEN: usize = 12;

/// Default maximum message age: one hour.
pub const DEFAULT_MAX_AGE_MS: u64 = 3_600_000;

/// Default allowance for sender clocks running ahead: one minute.
pub const DEFAULT_MAX_FUTURE_SKEW_MS: u64 = 60_000;

/// Staleness rules applied to decrypted payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    /// Reject payloads older than this
    pub max_age_ms: u64,
    /// Reject payloads dated further than this into the future
    pub max_future_skew_ms: u64,
    /// Accept untimestamped legacy payloads (skipping both checks)
    pub allow_legacy: bool,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            max_age_ms: DEFAULT_MAX_AGE_MS,
            max_future_skew_ms: DEFAULT_MAX_FUTURE_SKEW_MS,
            allow_legacy: true,
        }
    }
}

impl FreshnessPolicy {
    /// Check a payload against `now_ms`.
    pub fn check(&self, payload: &Payload, now_ms: u64) -> Result<(), CryptoError> {
        let Some(timestamp_ms) = payload.timestamp_ms() else {
            return if self.allow_legacy { Ok(()) } else { Err(CryptoError::LegacyPayloadRejected) };
        };

        let age_ms = now_ms.saturating_sub(timestamp_ms);
        if age_ms > self.max_age_ms {
            return Err(CryptoError::StaleMessage { age_ms, max_age_ms: self.max_age_ms });
        }

        let ahead_ms = timestamp_ms.saturating_sub(now_ms);
        if ahead_ms > self.max_future_skew_ms {
            return Err(CryptoError::FutureTimestamp {
                ahead_ms,
                max_skew_ms: self.max_future_skew_ms,
            });
        }

        Ok(())
    }
}

/// Ciphertext and the IV it was produced with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// Ciphertext followed by the 16-byte tag
    pub ciphertext: Vec<u8>,
    /// Fresh random nonce
    pub iv: [u8; IV_LEN],
}

fn cipher(key: &SessionKey) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::EncryptionFailed)
}

/// Encrypt an already-framed payload.
pub fn seal_payload(
    key: &SessionKey,
    payload: &Payload,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<Sealed, CryptoError> {
    let plaintext = payload.encode()?;

    let mut iv = [0u8; IV_LEN];
    rng.fill_bytes(&mut iv);

    let ciphertext = cipher(key)?
        .encrypt(Nonce::from_slice(&iv), plaintext.as_slice())
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(Sealed { ciphertext, iv })
}

/// Authenticate, decrypt and parse a payload. No freshness check.
pub fn open_payload(
    key: &SessionKey,
    ciphertext: &[u8],
    iv: &[u8],
) -> Result<Payload, CryptoError> {
    if iv.len() != IV_LEN {
        return Err(CryptoError::InvalidIv { expected: IV_LEN, actual: iv.len() });
    }

    let plaintext = cipher(key)?
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    Payload::decode(&plaintext)
}

/// Authenticate, decrypt, parse and freshness-check a payload.
pub fn open(
    key: &SessionKey,
    ciphertext: &[u8],
    iv: &[u8],
    now_ms: u64,
    policy: &FreshnessPolicy,
) -> Result<Payload, CryptoError> {
    let payload = open_payload(key, ciphertext, iv)?;
    policy.check(&payload, now_ms)?;
    Ok(payload)
}

/// Encrypt a message, stamping it with `now_ms`.
pub fn encrypt(
    key: &SessionKey,
    plaintext: &[u8],
    now_ms: u64,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<Sealed, CryptoError> {
    seal_payload(key, &Payload::Message { data: plaintext.to_vec(), timestamp_ms: now_ms }, rng)
}

/// Decrypt a message.
///
/// Legacy payloads are returned unchanged when the policy allows them. A
/// file payload here is a caller mix-up and is reported as malformed.
pub fn decrypt(
    key: &SessionKey,
    ciphertext: &[u8],
    iv: &[u8],
    now_ms: u64,
    policy: &FreshnessPolicy,
) -> Result<Vec<u8>, CryptoError> {
    match open(key, ciphertext, iv, now_ms, policy)? {
        payload @ (Payload::Message { .. } | Payload::Legacy(_)) => Ok(payload.into_data()),
        Payload::File { .. } => {
            Err(CryptoError::MalformedPayload("expected a message, found a file".to_string()))
        },
    }
}

/// Encrypt file bytes with an 8-byte timestamp prefix.
pub fn encrypt_file(
    key: &SessionKey,
    contents: &[u8],
    now_ms: u64,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<Sealed, CryptoError> {
    seal_payload(key, &Payload::File { data: contents.to_vec(), timestamp_ms: now_ms }, rng)
}

/// Decrypt file bytes.
pub fn decrypt_file(
    key: &SessionKey,
    ciphertext: &[u8],
    iv: &[u8],
    now_ms: u64,
    policy: &FreshnessPolicy,
) -> Result<Vec<u8>, CryptoError> {
    match open(key, ciphertext, iv, now_ms, policy)? {
        Payload::File { data, .. } => Ok(data),
        _ => Err(CryptoError::MalformedPayload("expected a file payload".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    const NOW: u64 = 1_700_000_000_000;

    fn key(byte: u8) -> SessionKey {
        SessionKey::from_bytes([byte; 32])
    }

    #[test]
    fn message_round_trip() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let sealed = encrypt(&key(1), b"hello bob", NOW, &mut rng).unwrap();
        let opened =
            decrypt(&key(1), &sealed.ciphertext, &sealed.iv, NOW + 10, &FreshnessPolicy::default())
                .unwrap();
        assert_eq!(opened, b"hello bob");
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let sealed = encrypt(&key(1), b"secret", NOW, &mut rng).unwrap();
        let policy = FreshnessPolicy::default();
        let result = decrypt(&key(2), &sealed.ciphertext, &sealed.iv, NOW, &policy);
        assert_eq!(result, Err(CryptoError::AuthenticationFailed));
    }

    #[test]
    fn two_hour_old_message_is_stale() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let sealed = encrypt(&key(1), b"old", NOW - 7_200_000, &mut rng).unwrap();
        let policy = FreshnessPolicy::default();
        let result = decrypt(&key(1), &sealed.ciphertext, &sealed.iv, NOW, &policy);
        assert_eq!(
            result,
            Err(CryptoError::StaleMessage { age_ms: 7_200_000, max_age_ms: DEFAULT_MAX_AGE_MS })
        );
    }

    #[test]
    fn age_exactly_at_limit_is_accepted() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let sealed = encrypt(&key(1), b"edge", NOW - DEFAULT_MAX_AGE_MS, &mut rng).unwrap();
        let policy = FreshnessPolicy::default();
        assert!(decrypt(&key(1), &sealed.ciphertext, &sealed.iv, NOW, &policy).is_ok());
    }

    #[test]
    fn future_timestamp_beyond_skew_is_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let policy = FreshnessPolicy::default();

        let within = encrypt(&key(1), b"x", NOW + 60_000, &mut rng).unwrap();
        assert!(decrypt(&key(1), &within.ciphertext, &within.iv, NOW, &policy).is_ok());

        let beyond = encrypt(&key(1), b"x", NOW + 60_001, &mut rng).unwrap();
        assert_eq!(
            decrypt(&key(1), &beyond.ciphertext, &beyond.iv, NOW, &policy),
            Err(CryptoError::FutureTimestamp { ahead_ms: 60_001, max_skew_ms: 60_000 })
        );
    }

    #[test]
    fn legacy_payload_passes_through_when_allowed() {
        let mut rng = ChaCha20Rng::seed_from_u64(6);
        let sealed = seal_payload(&key(1), &Payload::Legacy(b"raw".to_vec()), &mut rng).unwrap();

        let allowed = FreshnessPolicy::default();
        let opened = decrypt(&key(1), &sealed.ciphertext, &sealed.iv, NOW, &allowed).unwrap();
        assert_eq!(opened, b"raw");

        let strict = FreshnessPolicy { allow_legacy: false, ..FreshnessPolicy::default() };
        assert_eq!(
            decrypt(&key(1), &sealed.ciphertext, &sealed.iv, NOW, &strict),
            Err(CryptoError::LegacyPayloadRejected)
        );
    }

    #[test]
    fn file_round_trip_and_staleness() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let contents: Vec<u8> = (0..=255).collect();
        let policy = FreshnessPolicy::default();

        let sealed = encrypt_file(&key(3), &contents, NOW, &mut rng).unwrap();
        let opened = decrypt_file(&key(3), &sealed.ciphertext, &sealed.iv, NOW, &policy).unwrap();
        assert_eq!(opened, contents);

        let old = encrypt_file(&key(3), &contents, NOW - 7_200_000, &mut rng).unwrap();
        assert!(matches!(
            decrypt_file(&key(3), &old.ciphertext, &old.iv, NOW, &policy),
            Err(CryptoError::StaleMessage { .. })
        ));
    }

    #[test]
    fn message_and_file_decoders_are_not_interchangeable() {
        let mut rng = ChaCha20Rng::seed_from_u64(8);
        let policy = FreshnessPolicy::default();

        let file = encrypt_file(&key(1), b"f", NOW, &mut rng).unwrap();
        assert!(matches!(
            decrypt(&key(1), &file.ciphertext, &file.iv, NOW, &policy),
            Err(CryptoError::MalformedPayload(_))
        ));

        let message = encrypt(&key(1), b"m", NOW, &mut rng).unwrap();
        assert!(matches!(
            decrypt_file(&key(1), &message.ciphertext, &message.iv, NOW, &policy),
            Err(CryptoError::MalformedPayload(_))
        ));
    }

    #[test]
    fn short_iv_is_rejected() {
        let result = open_payload(&key(1), &[0; 32], &[0; 8]);
        assert_eq!(result, Err(CryptoError::InvalidIv { expected: IV_LEN, actual: 8 }));
    }
}
