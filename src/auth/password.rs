//! Argon2id password hashes stored as PHC strings

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use tracing::warn;

use crate::error::NexusError;

pub fn hash_password(password: &str) -> Result<String, NexusError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| NexusError::Internal(format!("Failed to hash password: {e}")))
}

/// Check a password against a stored hash.
///
/// A stored value that is not a PHC string (e.g. an account imported from
/// another system) never matches; the login then fails like a wrong password.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, NexusError> {
    let Ok(parsed) = PasswordHash::new(stored) else {
        warn!("Stored password hash is not a PHC string");
        return Ok(false);
    };
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("nexus-pass").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("nexus-pass", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
        assert_ne!(hash, hash_password("nexus-pass").unwrap());
    }

    #[test]
    fn test_foreign_hash_never_matches() {
        assert!(!verify_password("password", "password").unwrap());
        assert!(!verify_password("x", "$2b$12$legacybcrypt").unwrap());
    }
}
