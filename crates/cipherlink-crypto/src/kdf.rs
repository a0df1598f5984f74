//! Session key derivation.
//!
//! `session_key = HKDF-SHA256(salt = HKDF_SALT, ikm = X25519(local, remote),
//! info = context)`. Two parties that run agreement with reciprocal key
//! material and the same context derive byte-identical keys; a different
//! context yields an unrelated key.

use std::fmt;

use hkdf::Hkdf;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    error::CryptoError,
    keys::{AgreementPublicKey, KeyAgreement},
};

/// AES-256 key length.
pub const SESSION_KEY_LEN: usize = 32;

/// Fixed protocol salt for the extract step. Replaces the all-zero salt used
/// by earlier deployments, so keys derived here do not interoperate with them.
pub const HKDF_SALT: &[u8] = b"cipherlink/x3dh-session/v1";

/// 256-bit symmetric session key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    /// Wrap raw key bytes (e.g. loaded from the session store).
    pub fn from_bytes(bytes: [u8; SESSION_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes. Only for the cipher and the session store.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        self.0[..].ct_eq(&other.0[..]).into()
    }
}

impl Eq for SessionKey {}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Derive a session key from a key agreement and a context string.
///
/// The context must bind both party identifiers and the session; this
/// function does not check that, callers build it.
pub fn derive_session_key(
    local: &impl KeyAgreement,
    remote: &AgreementPublicKey,
    context: &str,
) -> Result<SessionKey, CryptoError> {
    let shared = local.agree(remote)?;
    expand(shared.as_bytes(), context)
}

fn expand(ikm: &[u8], context: &str) -> Result<SessionKey, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), ikm);
    let mut okm = [0u8; SESSION_KEY_LEN];
    hk.expand(context.as_bytes(), &mut okm)
        .map_err(|e| CryptoError::KeyAgreement(e.to_string()))?;
    Ok(SessionKey(okm))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::keys::{AgreementKeyPair, EphemeralKeyPair};

    #[test]
    fn reciprocal_agreement_derives_same_key() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let alice = AgreementKeyPair::generate(&mut rng);
        let bob = AgreementKeyPair::generate(&mut rng);

        let k1 = derive_session_key(&alice, &bob.public_key(), "alice||bob||1").unwrap();
        let k2 = derive_session_key(&bob, &alice.public_key(), "alice||bob||1").unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn different_context_gives_different_key() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let alice = AgreementKeyPair::generate(&mut rng);
        let bob = AgreementKeyPair::generate(&mut rng);

        let k1 = derive_session_key(&alice, &bob.public_key(), "alice||bob||1").unwrap();
        let k2 = derive_session_key(&alice, &bob.public_key(), "alice||bob||2").unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn ephemeral_derivation_matches_responder() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let bob = AgreementKeyPair::generate(&mut rng);
        let ephemeral = EphemeralKeyPair::generate(&mut rng);
        let ephemeral_public = ephemeral.public_key();

        let initiator = ephemeral.into_session_key(&bob.public_key(), "ctx").unwrap();
        let responder = derive_session_key(&bob, &ephemeral_public, "ctx").unwrap();
        assert_eq!(initiator, responder);
    }

    #[test]
    fn keys_differing_in_any_byte_are_unequal() {
        let base = [0x5a; SESSION_KEY_LEN];
        assert_eq!(SessionKey::from_bytes(base), SessionKey::from_bytes(base));

        for index in 0..SESSION_KEY_LEN {
            let mut other = base;
            other[index] ^= 0x01;
            assert_ne!(SessionKey::from_bytes(base), SessionKey::from_bytes(other), "byte {index}");
        }
    }

    #[test]
    fn debug_is_redacted() {
        let key = SessionKey::from_bytes([0x41; SESSION_KEY_LEN]);
        assert_eq!(format!("{key:?}"), "SessionKey(..)");
    }
}
