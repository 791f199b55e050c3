//! Cryptographic primitives for credential records.
//!
//! - `keys` — Ed25519 identity key pairs with a derived X25519 encryption pair
//! - `derivation` — HKDF-SHA256 key derivation
//! - `encryption` — sealed-box encryption (X25519 + ChaCha20-Poly1305)
//! - `signing` — Ed25519 signing and verification
//! - `random` — entropy helpers

pub mod derivation;
pub mod encryption;
pub mod keys;
pub mod random;
pub mod signing;

pub use keys::IdentityKeyPair;
