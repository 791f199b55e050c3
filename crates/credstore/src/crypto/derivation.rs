//! Key derivation using HKDF-SHA256.
//!
//! Derives scoped child keys from a 32-byte root seed using context
//! strings. The encryption key pair of an identity is derived from its
//! signing seed this way, so one persisted seed yields both key pairs.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::{Result, StoreError};

/// Derive a 32-byte child key from a root key and context string.
///
/// Uses HKDF-SHA256 (RFC 5869) with the root key as IKM and the context
/// as info.
pub fn derive_key(root_key_bytes: &[u8; 32], context: &str) -> Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(None, root_key_bytes);
    let mut output = [0u8; 32];
    hk.expand(context.as_bytes(), &mut output)
        .map_err(|e| StoreError::DerivationFailed(format!("HKDF expand failed: {e}")))?;
    Ok(output)
}

/// Derivation context for an identity's X25519 encryption key.
///
/// Must remain stable across versions: changing it invalidates every
/// published encryption key.
pub fn encryption_context() -> String {
    "credstore/encryption".to_string()
}

/// Derivation context for a sealed-box payload key.
pub fn sealed_box_context() -> String {
    "credstore/sealed-box".to_string()
}
