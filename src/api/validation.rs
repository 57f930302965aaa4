//! Input validation for API requests.
//!
//! Each validator returns `Err(message)` describing the first problem found.
//! Collect several with `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

/// Matches the width of the `users.email` column
pub const MAX_EMAIL_LENGTH: usize = 120;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;
pub const MAX_MESSAGE_LENGTH: usize = 32_000;

lazy_static! {
    /// Regex for validating email addresses (local@domain.tld)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)+$"
    ).unwrap();
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();

    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > MAX_EMAIL_LENGTH {
        return Err(format!(
            "Email is too long (max {} characters)",
            MAX_EMAIL_LENGTH
        ));
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate a password. Length is the only rule.
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        ));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(format!(
            "Password is too long (max {} characters)",
            MAX_PASSWORD_LENGTH
        ));
    }

    Ok(())
}

/// Validate a chat message sent to the assistant
pub fn validate_message(message: &str) -> Result<(), String> {
    if message.trim().is_empty() {
        return Err("Message is required".to_string());
    }

    if message.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(format!(
            "Message is too long (max {} characters)",
            MAX_MESSAGE_LENGTH
        ));
    }

    Ok(())
}
