//! Password hash helpers.
//!
//! The authentication contract is inherited from the legacy web client:
//! the client hashes the password and the resolver compares that hash
//! against the stored one.  There is no server-side verification step.
//! The comparison is constant-time so equality itself leaks no timing.

use subtle::ConstantTimeEq;

/// Hash a password with an optional salt.
///
/// Produces a hex-encoded BLAKE3 digest of `salt || password`.
pub fn hash_password(password: &str, salt: Option<&str>) -> String {
    let mut hasher = blake3::Hasher::new();
    if let Some(salt) = salt {
        hasher.update(salt.as_bytes());
    }
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

/// Constant-time equality of two hash strings.
///
/// Unequal lengths short-circuit; that only reveals the length, which for
/// hex digests is public anyway.
pub fn verify_hash(supplied: &str, stored: &str) -> bool {
    let a = supplied.as_bytes();
    let b = stored.as_bytes();
    a.len() == b.len() && a.ct_eq(b).unwrap_u8() == 1
}
