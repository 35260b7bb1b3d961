//! Identity signatures, ephemeral key agreement, and the transport cipher.
//!
//! - Identities are Ed25519 keypairs. The public half names an endpoint
//!   across sessions and is carried in every [`Info`](crate::Info).
//! - Each handshake attempt uses a fresh X25519 keypair. The raw DH output
//!   is run through HKDF-SHA256 to get the 32-byte session key.
//! - Transport payloads are XORed with an XChaCha20 keystream under the
//!   session key and a random 24-byte nonce per packet.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::XChaCha20;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::header::{NONCE_LEN, SIGNATURE_LEN};

/// Public signing key length
pub const PUBLIC_KEY_LEN: usize = 32;

/// Identity keypair length (seed followed by public key)
pub const KEYPAIR_LEN: usize = 64;

/// Shared key length
pub const SHARED_KEY_LEN: usize = 32;

const SHARED_KEY_INFO: &[u8] = b"whisper/v1 transport key";

/// Raw Ed25519 public key bytes
pub type PublicKey = [u8; PUBLIC_KEY_LEN];

/// Long-term Ed25519 signing identity.
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Generate a new identity from the OS CSPRNG
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Derive an identity from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Public signing key
    pub fn public_key(&self) -> PublicKey {
        *self.signing_key.verifying_key().as_bytes()
    }

    /// Private key in 64-byte keypair form
    pub fn keypair_bytes(&self) -> [u8; KEYPAIR_LEN] {
        self.signing_key.to_keypair_bytes()
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &hex::encode(self.public_key()))
            .finish_non_exhaustive()
    }
}

/// Verify an Ed25519 signature. Malformed keys never verify.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &[u8; SIGNATURE_LEN]) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    key.verify(message, &Signature::from_bytes(signature)).is_ok()
}

/// Per-handshake X25519 keypair.
pub struct EphemeralKeypair {
    secret: StaticSecret,
    public: X25519Public,
}

impl EphemeralKeypair {
    /// Generate a fresh keypair
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);
        Self { secret, public }
    }

    /// Public half as raw bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }
}

impl fmt::Debug for EphemeralKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeypair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

/// Symmetric session key.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKey([u8; SHARED_KEY_LEN]);

impl SharedKey {
    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; SHARED_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

/// Derive the session key from the peer's ephemeral public key and our own
/// ephemeral secret.
///
/// Commutative: `precompute(b.pub, a) == precompute(a.pub, b)`.
pub fn precompute(peer_public: &[u8; 32], own: &EphemeralKeypair) -> SharedKey {
    let dh = own.secret.diffie_hellman(&X25519Public::from(*peer_public));
    let hk = Hkdf::<Sha256>::new(None, dh.as_bytes());
    let mut okm = [0u8; SHARED_KEY_LEN];
    hk.expand(SHARED_KEY_INFO, &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    SharedKey(okm)
}

/// Fresh random nonce for one encrypted packet
pub fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// XOR `buf` in place with the XChaCha20 keystream for `key` and `nonce`.
///
/// Encryption and decryption are the same call.
pub fn apply_keystream(key: &SharedKey, nonce: &[u8; NONCE_LEN], buf: &mut [u8]) {
    let mut cipher = XChaCha20::new(
        chacha20::Key::from_slice(&key.0),
        chacha20::XNonce::from_slice(nonce),
    );
    cipher.apply_keystream(buf);
}
