//! Sealed-box encryption: X25519 key agreement with an ephemeral sender
//! key, HKDF-SHA256 key derivation, and ChaCha20-Poly1305 AEAD.
//!
//! Anyone holding an identity's published encryption key can seal a
//! payload for it; only the holder of the identity's seed can open it.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::crypto::{derivation, random};
use crate::error::{Result, StoreError};

/// Output of [`seal`]: everything the recipient needs besides their
/// static secret.
pub struct SealedPayload {
    /// Ephemeral X25519 public key of the sender.
    pub ephemeral_public: [u8; 32],
    /// ChaCha20-Poly1305 nonce.
    pub nonce: Vec<u8>,
    /// AEAD ciphertext.
    pub ciphertext: Vec<u8>,
}

/// Encrypt `plaintext` so that only the holder of `recipient`'s static
/// secret can read it.
pub fn seal(recipient: &X25519PublicKey, plaintext: &[u8]) -> Result<SealedPayload> {
    let ephemeral = EphemeralSecret::random_from_rng(rand::thread_rng());
    let ephemeral_public = X25519PublicKey::from(&ephemeral);

    let shared = ephemeral.diffie_hellman(recipient);
    let mut key = derivation::derive_key(shared.as_bytes(), &derivation::sealed_box_context())?;

    let (nonce, ciphertext) = encrypt(&key, plaintext)?;
    key.zeroize();

    Ok(SealedPayload {
        ephemeral_public: *ephemeral_public.as_bytes(),
        nonce,
        ciphertext,
    })
}

/// Decrypt a sealed payload with the recipient's static secret.
pub fn open(
    secret: &StaticSecret,
    ephemeral_public: &[u8; 32],
    nonce: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let shared = secret.diffie_hellman(&X25519PublicKey::from(*ephemeral_public));
    let mut key = derivation::derive_key(shared.as_bytes(), &derivation::sealed_box_context())?;
    let result = decrypt(&key, nonce, ciphertext);
    key.zeroize();
    result
}

/// Encrypt plaintext with ChaCha20-Poly1305.
///
/// Returns `(nonce, ciphertext)`. The nonce must be stored alongside
/// the ciphertext for decryption.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let nonce_bytes = random::random_nonce_12();
    let nonce = Nonce::from_slice(&nonce_bytes);
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| StoreError::EncryptionFailed(format!("cipher init: {e}")))?;
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| StoreError::EncryptionFailed(format!("encrypt: {e}")))?;
    Ok((nonce_bytes.to_vec(), ciphertext))
}

/// Decrypt ciphertext with ChaCha20-Poly1305.
pub fn decrypt(key: &[u8; 32], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let nonce = Nonce::from_slice(nonce);
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| StoreError::DecryptionFailed(format!("cipher init: {e}")))?;
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| StoreError::DecryptionFailed("AEAD authentication failed".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::IdentityKeyPair;

    #[test]
    fn test_chacha20poly1305_encrypt_decrypt() {
        let key = [42u8; 32];
        let plaintext = b"credential payload";
        let (nonce, ciphertext) = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &nonce, &ciphertext).unwrap();
        assert_eq!(&decrypted, plaintext);
    }

    #[test]
    fn test_chacha20poly1305_tamper_detection() {
        let key = [42u8; 32];
        let plaintext = b"credential payload";
        let (nonce, mut ciphertext) = encrypt(&key, plaintext).unwrap();
        if let Some(byte) = ciphertext.last_mut() {
            *byte ^= 0xFF;
        }
        assert!(decrypt(&key, &nonce, &ciphertext).is_err());
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let recipient = IdentityKeyPair::generate().unwrap();
        let plaintext = b"for your eyes only";

        let sealed = seal(&recipient.encryption_public(), plaintext).unwrap();
        let opened = open(
            recipient.encryption_secret(),
            &sealed.ephemeral_public,
            &sealed.nonce,
            &sealed.ciphertext,
        )
        .unwrap();
        assert_eq!(&opened, plaintext);
    }

    #[test]
    fn test_open_with_wrong_secret_fails() {
        let recipient = IdentityKeyPair::generate().unwrap();
        let other = IdentityKeyPair::generate().unwrap();

        let sealed = seal(&recipient.encryption_public(), b"secret").unwrap();
        let result = open(
            other.encryption_secret(),
            &sealed.ephemeral_public,
            &sealed.nonce,
            &sealed.ciphertext,
        );
        assert!(matches!(result, Err(StoreError::DecryptionFailed(_))));
    }

    #[test]
    fn test_seal_uses_fresh_ephemeral_keys() {
        let recipient = IdentityKeyPair::generate().unwrap();
        let a = seal(&recipient.encryption_public(), b"x").unwrap();
        let b = seal(&recipient.encryption_public(), b"x").unwrap();
        assert_ne!(a.ephemeral_public, b.ephemeral_public);
        assert_ne!(a.ciphertext, b.ciphertext);
    }
}
