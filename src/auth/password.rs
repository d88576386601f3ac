//! Account passwords: Argon2id hashing plus the registration policy

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::{FieldError, WellspringError};

/// Minimum accepted password length at registration
pub const MIN_PASSWORD_LEN: usize = 8;

/// Hash a password, returning the PHC string (salt and parameters included)
pub fn hash_password(password: &str) -> Result<String, WellspringError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| WellspringError::Auth(format!("Failed to hash password: {e}")))
}

/// Check a login attempt against the stored PHC hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, WellspringError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| WellspringError::Auth(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Registration policy: length and a mix of letters and digits
pub fn check_password_policy(password: &str) -> Option<FieldError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Some(FieldError::new(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_letter && has_digit) {
        return Some(FieldError::new("password", "must contain letters and digits"));
    }
    None
}
