//! Local checks on user supplied email addresses and one-time codes.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::SessionError;

/// Non-empty local part, a single `@`, and a domain with at least one dot.
/// Whitespace anywhere is rejected.
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// Validates `email` and returns its canonical (lower-cased) form.
///
/// # Errors
/// Returns [`SessionError::InvalidInput`] if the address does not match the
/// conservative `local@domain.tld` shape.
pub fn normalize_email(email: &str) -> Result<String, SessionError> {
    if email.is_empty() {
        return Err(SessionError::invalid_input("email", "must not be empty"));
    }
    if !EMAIL_PATTERN.is_match(email) {
        return Err(SessionError::invalid_input(
            "email",
            "not a valid email address",
        ));
    }
    Ok(email.to_lowercase())
}

/// Validates a one-time code and returns it trimmed.
///
/// # Errors
/// Returns [`SessionError::InvalidInput`] if the code is empty.
pub fn normalize_code(code: &str) -> Result<String, SessionError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(SessionError::invalid_input("code", "must not be empty"));
    }
    Ok(code.to_string())
}

/// Masks an address for logging: `user@example.com` becomes `u***@example.com`.
pub(crate) fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().unwrap_or('*');
            format!("{first}***@{domain}")
        }
        None => "***".to_string(),
    }
}
