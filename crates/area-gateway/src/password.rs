// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Password policy and argon2id hashing.

use area_core::AreaError;
use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Require length, mixed case, a digit, and an ASCII punctuation character.
pub fn validate_password(password: &str) -> Result<(), AreaError> {
    let mut missing = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LEN {
        missing.push(format!("at least {MIN_PASSWORD_LEN} characters"));
    }
    if !password.chars().any(char::is_lowercase) {
        missing.push("a lowercase letter".to_string());
    }
    if !password.chars().any(char::is_uppercase) {
        missing.push("an uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        missing.push("a digit".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_punctuation()) {
        missing.push("a special character".to_string());
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AreaError::BadRequest(format!(
            "Password must contain {}",
            missing.join(", ")
        )))
    }
}

pub fn hash_password(password: &str) -> Result<String, AreaError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AreaError::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AreaError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AreaError::Internal(format!("stored password hash is malformed: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Hash on the blocking pool; argon2 is deliberately slow.
pub async fn hash_password_blocking(password: String) -> Result<String, AreaError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AreaError::Internal(format!("password task failed: {e}")))?
}

pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool, AreaError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AreaError::Internal(format!("password task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_lists_every_missing_class() {
        let err = validate_password("short").unwrap_err().to_string();
        assert!(err.contains("at least 8 characters"));
        assert!(err.contains("an uppercase letter"));
        assert!(err.contains("a digit"));
        assert!(err.contains("a special character"));
        assert!(!err.contains("lowercase"));
    }

    #[test]
    fn strong_password_passes() {
        assert!(validate_password("Correct-Horse-9").is_ok());
    }

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("Correct-Horse-9").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("Correct-Horse-9", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }
}
