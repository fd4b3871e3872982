//! Project key generation and verification.
//!
//! Keys are bearer credentials: stores keep only the SHA-256 hash, and
//! verification compares in constant time.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Prefix applied to generated keys: `braidql_<token>`.
pub const KEY_PREFIX: &str = "braidql";

/// Generate a URL-safe project key.
#[must_use]
pub fn generate_key(prefix: &str) -> String {
    let mut token = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut token);
    format!("{prefix}_{}", URL_SAFE_NO_PAD.encode(token))
}

/// Hash a key for storage (SHA-256, hex).
#[must_use]
pub fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Verify a key against a stored hash in constant time.
#[must_use]
pub fn verify_key(key: &str, stored_hash: &str) -> bool {
    let computed = hash_key(key);
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_are_prefixed_and_unique() {
        let a = generate_key(KEY_PREFIX);
        let b = generate_key(KEY_PREFIX);
        assert!(a.starts_with("braidql_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_round_trip() {
        let key = generate_key(KEY_PREFIX);
        let stored = hash_key(&key);
        assert!(verify_key(&key, &stored));
        assert!(!verify_key("braidql_wrong", &stored));
    }

    #[test]
    fn test_hash_is_stable_hex() {
        let h = hash_key("braidql_abc");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_key("braidql_abc"));
    }
}
