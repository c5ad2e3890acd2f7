//! Password hashing for the login path (spec §4.6). Credential storage
//! itself (how `passwordHash` gets into a `User` record) is out of scope per
//! spec §1 Non-goals; this module only supplies the hash/verify primitives
//! `auth-api`'s login handler needs, using the teacher's own `argon2`
//! dependency rather than hand-rolling a KDF.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use modkit_errors::ApiError;

/// Hash a plaintext password for storage.
///
/// # Errors
/// Returns `ApiError::internal` if the underlying KDF fails (out-of-memory
/// class failure, not a caller mistake).
pub fn hash_password(plaintext: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ApiError::internal(format!("password hashing failed: {e}")))
}

/// Verify a plaintext password against a stored hash. Never distinguishes
/// "wrong password" from "malformed hash" to the caller — both are simply
/// not-a-match.
#[must_use]
pub fn verify_password(plaintext: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default().verify_password(plaintext.as_bytes(), &parsed).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("correct horse battery staple").expect("hashes");
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-real-hash"));
    }
}
