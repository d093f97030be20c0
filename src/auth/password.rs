/// Password Policy, Hashing and Verification
///
/// Handles the fixed password strength policy and bcrypt hashing.

use bcrypt::{hash, verify, DEFAULT_COST};
use lazy_static::lazy_static;

use crate::error::AuthError;

const MIN_PASSWORD_LENGTH: usize = 8;

lazy_static! {
    /// Compared against when the account does not exist, so that a failed
    /// login costs one bcrypt verification either way.
    static ref DUMMY_HASH: Option<String> = hash("dummy-password-Aa1!", DEFAULT_COST).ok();
}

/// Validate password strength requirements
///
/// Requirements (fixed, not configurable):
/// - Not empty (reported as `EmptyPassword`)
/// - At least 8 Unicode code points
/// - At least one lowercase letter, one uppercase letter, one digit
/// - At least one punctuation or symbol character
pub fn check_password_policy(password: &str) -> Result<(), AuthError> {
    check_password_shape(password)?;

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword);
    }

    let has_lowercase = password.chars().any(char::is_lowercase);
    let has_uppercase = password.chars().any(char::is_uppercase);
    let has_digit = password.chars().any(char::is_numeric);
    let has_symbol = password.chars().any(is_symbol);

    if !(has_lowercase && has_uppercase && has_digit && has_symbol) {
        return Err(AuthError::WeakPassword);
    }

    Ok(())
}

/// Login-time check: only emptiness is rejected, strength is not re-checked.
pub fn check_password_shape(password: &str) -> Result<(), AuthError> {
    if password.is_empty() {
        return Err(AuthError::EmptyPassword);
    }
    Ok(())
}

fn is_symbol(c: char) -> bool {
    c.is_ascii_punctuation() || !(c.is_alphanumeric() || c.is_whitespace() || c.is_control())
}

/// Hash a password using bcrypt at the library's default cost
///
/// # Errors
/// Only fails if bcrypt itself fails (entropy or library error).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    hash(password, DEFAULT_COST).map_err(|e| AuthError::internal("hash_password", e))
}

/// Verify a password against its hash
///
/// Any structural problem with the stored hash yields `false`.
pub fn verify_password(password_hash: &str, password: &str) -> bool {
    verify(password, password_hash).unwrap_or(false)
}

/// `hash_password` on the blocking pool; bcrypt is CPU-bound.
pub async fn hash_password_blocking(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::internal("hash_password", e))?
}

/// `verify_password` on the blocking pool.
///
/// With `password_hash = None` the password is checked against a dummy
/// hash and the result is always `false`.
pub async fn verify_password_blocking(
    password_hash: Option<String>,
    password: String,
) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || match password_hash {
        Some(stored) => verify_password(&stored, &password),
        None => {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                let _ = verify_password(dummy, &password);
            }
            false
        }
    })
    .await
    .map_err(|e| AuthError::internal("verify_password", e))
}
