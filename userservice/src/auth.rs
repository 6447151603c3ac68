//! Password verification against the stored Argon2id PHC hash. The argon2
//! verifier compares in constant time by construction.

use argon2::password_hash::{PasswordHash, PasswordVerifier};
use argon2::Argon2;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid password hash: {0}")]
    InvalidHash(String),
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed_hash =
        PasswordHash::new(hash.trim()).map_err(|e| AuthError::InvalidHash(e.to_string()))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::InvalidHash(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};

    fn hash(password: &str) -> String {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .unwrap()
            .to_string()
    }

    #[test]
    fn accepts_the_correct_password() {
        let stored = hash("secret");
        assert!(verify_password("secret", &stored).unwrap());
    }

    #[test]
    fn rejects_a_wrong_password() {
        let stored = hash("secret");
        assert!(!verify_password("wrong", &stored).unwrap());
    }

    #[test]
    fn tolerates_surrounding_whitespace_in_the_stored_hash() {
        let stored = format!("  {}\n", hash("secret"));
        assert!(verify_password("secret", &stored).unwrap());
    }

    #[test]
    fn malformed_hashes_are_an_error_not_a_mismatch() {
        assert!(verify_password("secret", "not-a-phc-hash").is_err());
    }
}
