/// Email address validation and normalization
///
/// Addresses are trimmed, checked against a practical subset of the RFC 5322
/// `addr-spec` grammar (dot-atom local part, dotted hostname domain) and
/// lower-cased so that lookups are case-insensitive.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::AuthError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MAX_LOCAL_PART_LENGTH: usize = 64; // RFC 5321

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).expect("email regex is valid");
}

/// Normalize a raw email address
///
/// Returns the trimmed, lower-cased address. Empty input, a missing or
/// repeated `@`, and any other malformed address all fail with
/// `AuthError::InvalidEmail`.
pub fn normalize_email(raw: &str) -> Result<String, AuthError> {
    let trimmed = raw.trim();

    if trimmed.is_empty() || trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(AuthError::InvalidEmail);
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(AuthError::InvalidEmail);
    }

    // The regex guarantees exactly one '@'.
    let (local, _) = trimmed.split_once('@').ok_or(AuthError::InvalidEmail)?;
    if !is_dot_atom(local) {
        return Err(AuthError::InvalidEmail);
    }

    Ok(trimmed.to_lowercase())
}

/// Dots may only separate non-empty atoms.
fn is_dot_atom(local: &str) -> bool {
    local.len() <= MAX_LOCAL_PART_LENGTH && local.split('.').all(|atom| !atom.is_empty())
}
