use crate::error::ValidationError;
use regex::Regex;
use std::sync::LazyLock;

/// Longest identity value accepted, matching the practical email length limit
pub const MAX_IDENTITY_LENGTH: usize = 254;

/// Lazy-loaded email validation regex
///
/// A practical subset of RFC 5322, compiled once and reused.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("Invalid email regex pattern")
});

/// Validates an email address
///
/// # Examples
///
/// ```rust
/// use kagi_core::validation::validate_email;
///
/// assert!(validate_email("user@example.com").is_ok());
/// assert!(validate_email("invalid-email").is_err());
/// ```
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::MissingField(
            "Email is required".to_string(),
        ));
    }

    if email.len() > MAX_IDENTITY_LENGTH {
        return Err(ValidationError::InvalidEmail(
            "Email is too long".to_string(),
        ));
    }

    if EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail(format!(
            "Invalid email format: {email}"
        )))
    }
}

/// Validates a raw identity value before a token is issued for it.
///
/// Identity values must be non-blank and bounded in length. Format rules
/// beyond that belong to the identity field (see [`validate_email`]).
pub fn validate_identity(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(
            "Identity is required".to_string(),
        ));
    }

    if value.len() > MAX_IDENTITY_LENGTH {
        return Err(ValidationError::InvalidIdentity(
            "Identity is too long".to_string(),
        ));
    }

    if value.chars().any(char::is_control) {
        return Err(ValidationError::InvalidIdentity(
            "Identity contains control characters".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email_valid() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("first.last+tag@sub.example.org").is_ok());
    }

    #[test]
    fn test_validate_email_invalid() {
        assert!(matches!(
            validate_email(""),
            Err(ValidationError::MissingField(_))
        ));
        assert!(matches!(
            validate_email("not-an-email"),
            Err(ValidationError::InvalidEmail(_))
        ));
        assert!(matches!(
            validate_email("user@localhost"),
            Err(ValidationError::InvalidEmail(_))
        ));

        let long_email = format!("{}@example.com", "a".repeat(250));
        assert!(matches!(
            validate_email(&long_email),
            Err(ValidationError::InvalidEmail(_))
        ));
    }

    #[test]
    fn test_validate_identity() {
        assert!(validate_identity("alice").is_ok());
        assert!(validate_identity("+15555550100").is_ok());

        assert!(matches!(
            validate_identity("   "),
            Err(ValidationError::MissingField(_))
        ));
        assert!(matches!(
            validate_identity("bad\nvalue"),
            Err(ValidationError::InvalidIdentity(_))
        ));
        assert!(matches!(
            validate_identity(&"x".repeat(255)),
            Err(ValidationError::InvalidIdentity(_))
        ));
    }
}
