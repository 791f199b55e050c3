//! Identity key pairs.
//!
//! Each locally-owned identity holds a single 32-byte seed. The Ed25519
//! signing key is built directly from the seed; the X25519 encryption
//! key is derived from it via HKDF, so the persisted private-key file
//! contains exactly one secret.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use ed25519_dalek::{SigningKey, VerifyingKey};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::crypto::{derivation, random};
use crate::error::{Result, StoreError};

/// A full identity key pair: Ed25519 for signing plus a derived X25519
/// static secret for sealed-box decryption.
///
/// The seed is zeroized on drop.
pub struct IdentityKeyPair {
    seed: [u8; 32],
    signing_key: SigningKey,
    encryption_secret: StaticSecret,
}

impl IdentityKeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Result<Self> {
        Self::from_seed(&random::random_seed_32())
    }

    /// Reconstruct a key pair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self> {
        let signing_key = SigningKey::from_bytes(seed);
        let enc_bytes = derivation::derive_key(seed, &derivation::encryption_context())?;
        let encryption_secret = StaticSecret::from(enc_bytes);
        Ok(Self {
            seed: *seed,
            signing_key,
            encryption_secret,
        })
    }

    /// Reconstruct a key pair from a base64-encoded seed, the format used
    /// in persisted private-key files.
    pub fn from_seed_b64(seed_b64: &str) -> Result<Self> {
        let bytes = B64
            .decode(seed_b64.trim())
            .map_err(|e| StoreError::InvalidKey(format!("invalid base64 seed: {e}")))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| StoreError::InvalidKey("seed must be 32 bytes".into()))?;
        Self::from_seed(&seed)
    }

    /// Return the seed encoded as base64. Caller is responsible for not
    /// letting the string escape into logs.
    pub fn seed_b64(&self) -> String {
        B64.encode(self.seed)
    }

    /// Return a reference to the Ed25519 signing key.
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Return the Ed25519 verifying (public) key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Return the verifying key encoded as base64, the format published
    /// in metadata documents.
    pub fn verifying_key_b64(&self) -> String {
        B64.encode(self.verifying_key().to_bytes())
    }

    /// Return a reference to the X25519 static secret.
    pub fn encryption_secret(&self) -> &StaticSecret {
        &self.encryption_secret
    }

    /// Return the X25519 public key.
    pub fn encryption_public(&self) -> X25519PublicKey {
        X25519PublicKey::from(&self.encryption_secret)
    }

    /// Return the X25519 public key encoded as base64.
    pub fn encryption_public_b64(&self) -> String {
        B64.encode(self.encryption_public().as_bytes())
    }
}

impl Drop for IdentityKeyPair {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

/// Decode a base64-encoded Ed25519 verifying key.
pub fn verifying_key_from_b64(key_b64: &str) -> Result<VerifyingKey> {
    let bytes = decode_key_32(key_b64)?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| StoreError::InvalidKey(format!("invalid verifying key: {e}")))
}

/// Decode a base64-encoded X25519 public key.
pub fn encryption_public_from_b64(key_b64: &str) -> Result<X25519PublicKey> {
    Ok(X25519PublicKey::from(decode_key_32(key_b64)?))
}

fn decode_key_32(key_b64: &str) -> Result<[u8; 32]> {
    let bytes = B64
        .decode(key_b64.trim())
        .map_err(|e| StoreError::InvalidKey(format!("invalid base64 key: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| StoreError::InvalidKey("key must be 32 bytes".into()))
}
