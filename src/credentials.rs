//! Password hashing for stored user credentials.
//!
//! Hashes are bcrypt strings with a fresh random salt per call, so two users
//! with the same password never share a hash.

use bcrypt::{hash, verify, BcryptError};

/// Work factor used when none is configured.
pub const DEFAULT_COST: u32 = 10;

/// Hash `raw_password` with a new random salt.
pub fn hash_password(raw_password: &str, cost: u32) -> Result<String, BcryptError> {
    hash(raw_password, cost)
}

/// Check `raw_password` against a stored bcrypt hash.
///
/// A malformed stored hash is reported as an error rather than a mismatch.
pub fn verify_password(raw_password: &str, stored_hash: &str) -> Result<bool, BcryptError> {
    verify(raw_password, stored_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_and_is_salted() {
        let a = hash_password("hunter22", 4).unwrap();
        let b = hash_password("hunter22", 4).unwrap();
        assert_ne!(a, b);
        assert!(verify_password("hunter22", &a).unwrap());
        assert!(!verify_password("hunter23", &a).unwrap());
    }

    #[test]
    fn garbage_hash_is_an_error() {
        assert!(verify_password("hunter22", "not-a-bcrypt-hash").is_err());
    }
}
