//! Identity and ephemeral key pairs.
//!
//! Secret halves are generated from caller-supplied randomness and have no
//! accessor, no `Clone` and no serialization: they cannot leave the process.
//! Public halves import and export as raw 32-byte strings.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::{CryptoRng, RngCore};
use x25519_dalek::StaticSecret;
use zeroize::Zeroize;

use crate::{error::CryptoError, fingerprint::Fingerprint, kdf, kdf::SessionKey};

/// Raw public key length for both Ed25519 and X25519.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Ed25519 signature length.
pub const SIGNATURE_LEN: usize = 64;

fn random_seed(rng: &mut (impl RngCore + CryptoRng)) -> [u8; 32] {
    let mut seed = [0u8; 32];
    rng.fill_bytes(&mut seed);
    seed
}

fn fixed_len(bytes: &[u8]) -> Result<[u8; PUBLIC_KEY_LEN], CryptoError> {
    <[u8; PUBLIC_KEY_LEN]>::try_from(bytes).map_err(|_| {
        CryptoError::InvalidKeyFormat(format!(
            "expected {PUBLIC_KEY_LEN} bytes, got {}",
            bytes.len()
        ))
    })
}

/// Long-term Ed25519 signing pair.
pub struct SigningKeyPair {
    secret: SigningKey,
}

impl SigningKeyPair {
    /// Generate a fresh signing pair.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let mut seed = random_seed(rng);
        let secret = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Self { secret }
    }

    /// Public half.
    pub fn public_key(&self) -> SigningPublicKey {
        SigningPublicKey(self.secret.verifying_key())
    }

    /// Sign `message`. Ed25519 is deterministic: same key and message give
    /// the same signature.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.secret.sign(message).to_bytes()
    }
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair").field("public", &self.public_key()).finish_non_exhaustive()
    }
}

/// Ed25519 verifying key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SigningPublicKey(VerifyingKey);

impl SigningPublicKey {
    /// Import raw key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw = fixed_len(bytes)?;
        VerifyingKey::from_bytes(&raw)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))
    }

    /// Export raw key bytes.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.0.to_bytes()
    }

    /// Verify `signature` over `message`.
    ///
    /// Uses strict verification (rejects small-order keys and non-canonical
    /// signatures). A signature of the wrong length simply fails.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(raw) = <[u8; SIGNATURE_LEN]>::try_from(signature) else {
            return false;
        };
        let signature = Signature::from_bytes(&raw);
        self.0.verify_strict(message, &signature).is_ok()
    }
}

impl fmt::Debug for SigningPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningPublicKey({})", hex::encode(self.to_bytes()))
    }
}

/// X25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgreementPublicKey(x25519_dalek::PublicKey);

impl AgreementPublicKey {
    /// Import raw key bytes.
    ///
    /// Every 32-byte string is a valid Montgomery u-coordinate; low-order
    /// points are caught at agreement time instead.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self(x25519_dalek::PublicKey::from(fixed_len(bytes)?)))
    }

    /// Export raw key bytes.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.0.to_bytes()
    }
}

impl fmt::Debug for AgreementPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgreementPublicKey({})", hex::encode(self.to_bytes()))
    }
}

/// Raw X25519 output. Zeroized on drop.
pub struct SharedSecret(x25519_dalek::SharedSecret);

impl SharedSecret {
    /// Secret bytes, for feeding a KDF.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

/// Anything holding an X25519 private key.
pub trait KeyAgreement {
    /// Compute the shared secret with `remote`.
    ///
    /// Fails with [`CryptoError::KeyAgreement`] if `remote` is a low-order
    /// point (the result would not depend on our secret).
    fn agree(&self, remote: &AgreementPublicKey) -> Result<SharedSecret, CryptoError>;
}

/// Long-term X25519 agreement pair.
pub struct AgreementKeyPair {
    secret: StaticSecret,
    public: x25519_dalek::PublicKey,
}

impl AgreementKeyPair {
    /// Generate a fresh agreement pair.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let mut seed = random_seed(rng);
        let secret = StaticSecret::from(seed);
        seed.zeroize();
        let public = x25519_dalek::PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public half.
    pub fn public_key(&self) -> AgreementPublicKey {
        AgreementPublicKey(self.public)
    }
}

impl KeyAgreement for AgreementKeyPair {
    fn agree(&self, remote: &AgreementPublicKey) -> Result<SharedSecret, CryptoError> {
        let shared = self.secret.diffie_hellman(&remote.0);
        if !shared.was_contributory() {
            return Err(CryptoError::KeyAgreement("non-contributory shared secret".to_string()));
        }
        Ok(SharedSecret(shared))
    }
}

impl fmt::Debug for AgreementKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgreementKeyPair")
            .field("public", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Single-use X25519 pair for one exchange.
///
/// Deriving a session key consumes the pair, so the private half is dropped
/// (and zeroized) as soon as the key exists.
#[derive(Debug)]
pub struct EphemeralKeyPair {
    inner: AgreementKeyPair,
}

impl EphemeralKeyPair {
    /// Generate a fresh ephemeral pair.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        Self { inner: AgreementKeyPair::generate(rng) }
    }

    /// Public half, to be transmitted to the responder.
    pub fn public_key(&self) -> AgreementPublicKey {
        self.inner.public_key()
    }

    /// Derive the session key with `remote` and discard the private half.
    pub fn into_session_key(
        self,
        remote: &AgreementPublicKey,
        context: &str,
    ) -> Result<SessionKey, CryptoError> {
        kdf::derive_session_key(&self.inner, remote, context)
    }
}

/// A party's long-term identity: one signing pair, one agreement pair.
#[derive(Debug)]
pub struct IdentityKeyPair {
    signing: SigningKeyPair,
    agreement: AgreementKeyPair,
}

impl IdentityKeyPair {
    /// Generate a new identity. Done once per account.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let signing = SigningKeyPair::generate(rng);
        let agreement = AgreementKeyPair::generate(rng);
        Self { signing, agreement }
    }

    /// Signing pair.
    pub fn signing(&self) -> &SigningKeyPair {
        &self.signing
    }

    /// Agreement pair.
    pub fn agreement(&self) -> &AgreementKeyPair {
        &self.agreement
    }

    /// Public halves, as published to the key directory.
    pub fn public_identity(&self) -> PublicIdentity {
        PublicIdentity {
            signing: self.signing.public_key(),
            agreement: self.agreement.public_key(),
        }
    }
}

/// Public halves of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicIdentity {
    /// Verifying key for headers and envelopes
    pub signing: SigningPublicKey,
    /// Long-term key-agreement key
    pub agreement: AgreementPublicKey,
}

impl PublicIdentity {
    /// Fingerprint for out-of-band comparison.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }
}

/// What an imported public key is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicKeyRole {
    /// Ed25519 verifying key
    Signing,
    /// X25519 agreement key
    Agreement,
}

/// Public key tagged with its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicKey {
    /// Ed25519 verifying key
    Signing(SigningPublicKey),
    /// X25519 agreement key
    Agreement(AgreementPublicKey),
}

impl PublicKey {
    /// Role of this key.
    pub fn role(&self) -> PublicKeyRole {
        match self {
            Self::Signing(_) => PublicKeyRole::Signing,
            Self::Agreement(_) => PublicKeyRole::Agreement,
        }
    }
}

/// Serialize a public key to its raw form.
pub fn export_public_key(key: &PublicKey) -> Vec<u8> {
    match key {
        PublicKey::Signing(k) => k.to_bytes().to_vec(),
        PublicKey::Agreement(k) => k.to_bytes().to_vec(),
    }
}

/// Parse a raw public key for the given role.
pub fn import_public_key(bytes: &[u8], role: PublicKeyRole) -> Result<PublicKey, CryptoError> {
    match role {
        PublicKeyRole::Signing => SigningPublicKey::from_bytes(bytes).map(PublicKey::Signing),
        PublicKeyRole::Agreement => AgreementPublicKey::from_bytes(bytes).map(PublicKey::Agreement),
    }
}
