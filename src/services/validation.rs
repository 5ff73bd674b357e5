//! Identifier normalization and registration field rules.
//!
//! Rules run in a fixed order and the first violation wins, so callers can
//! surface exactly one message per attempt.

use sha2::{Digest, Sha256};

use super::token::bytes_to_hex;

const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("please complete all required fields")]
    MissingFields,
    #[error("enter a valid email")]
    InvalidEmail,
    #[error("username must be at least 3 characters using only letters, numbers, and underscores")]
    InvalidUsername,
    #[error("password must be 8+ characters with at least one letter and one number")]
    WeakPassword,
}

/// Trim and lower-case a login identifier or email.
#[must_use]
pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// `local@domain.tld`: no whitespace, exactly one `@`, and a dot inside the
/// domain with text on both sides.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .rsplit_once('.')
        .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
}

#[must_use]
pub fn is_valid_username(username: &str) -> bool {
    username.chars().count() >= MIN_USERNAME_LEN
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[must_use]
pub fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
        && password.chars().any(|c| c.is_ascii_alphabetic())
        && password.chars().any(|c| c.is_ascii_digit())
}

/// Check registration fields in order: presence, email, username, password.
///
/// `email` is expected already normalized and `username` already trimmed.
///
/// # Errors
///
/// Returns the first violated rule.
pub fn validate_registration(email: &str, username: &str, password: &str) -> Result<(), ValidationError> {
    if email.is_empty() || username.is_empty() || password.is_empty() {
        return Err(ValidationError::MissingFields);
    }
    if !is_valid_email(email) {
        return Err(ValidationError::InvalidEmail);
    }
    if !is_valid_username(username) {
        return Err(ValidationError::InvalidUsername);
    }
    if !is_strong_password(password) {
        return Err(ValidationError::WeakPassword);
    }
    Ok(())
}

/// Hex SHA-256 of a password. Demonstration-grade: unsalted.
#[must_use]
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    bytes_to_hex(&hasher.finalize())
}

#[cfg(test)]
#[path = "validation_test.rs"]
mod tests;
