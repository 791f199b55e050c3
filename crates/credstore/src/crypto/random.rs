//! Entropy helpers backed by the OS random number generator.

use rand::RngCore;

/// Generate a random 12-byte nonce for ChaCha20-Poly1305.
pub fn random_nonce_12() -> [u8; 12] {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Generate a random 32-byte key seed.
pub fn random_seed_32() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonces_are_unique() {
        let a = random_nonce_12();
        let b = random_nonce_12();
        assert_ne!(a, b);
    }

    #[test]
    fn test_seed_is_nonzero() {
        let seed = random_seed_32();
        assert!(seed.iter().any(|&b| b != 0));
    }
}
