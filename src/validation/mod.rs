use std::fmt;

pub const NAME_MAX_LEN: usize = 50;
pub const DESCRIPTION_MAX_LEN: usize = 500;
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 30;
pub const PHONE_MIN_DIGITS: usize = 11;
pub const PHONE_MAX_DIGITS: usize = 15;
pub const PASSWORD_MIN_LEN: usize = 6;
pub const NEW_PASSWORD_MIN_LEN: usize = 8;
pub const CONTACT_FIELD_MAX_LEN: usize = 200;
pub const CONTACT_MESSAGE_MAX_LEN: usize = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control() || ch.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

/// Matches `local@domain.tld` with no whitespace and a single `@`.
pub fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }

    // Needs a dot with at least one character on either side.
    domain
        .char_indices()
        .any(|(i, ch)| ch == '.' && i > 0 && i + 1 < domain.len())
}

pub fn validate_email(field: &'static str, value: &str) -> ValidationResult {
    validate_required(field, value)?;
    if !is_valid_email(value.trim()) {
        return Err(ValidationError::new(field, "must be a valid email address"));
    }

    Ok(())
}

pub fn validate_phone(value: &str) -> ValidationResult {
    let value = value.trim();
    validate_required("phone", value)?;

    if !value.chars().all(|ch| ch.is_ascii_digit())
        || !(PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&value.len())
    {
        return Err(ValidationError::new(
            "phone",
            format!(
                "must contain {} to {} digits",
                PHONE_MIN_DIGITS, PHONE_MAX_DIGITS
            ),
        ));
    }

    Ok(())
}

pub fn validate_username(value: &str) -> ValidationResult {
    let value = value.trim();
    validate_required("userName", value)?;

    let len = value.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(ValidationError::new(
            "userName",
            format!(
                "must be between {} and {} characters",
                USERNAME_MIN_LEN, USERNAME_MAX_LEN
            ),
        ));
    }

    Ok(())
}

pub fn validate_password(field: &'static str, value: &str, min_len: usize) -> ValidationResult {
    if value.chars().count() < min_len {
        return Err(ValidationError::new(
            field,
            format!("must be at least {} characters long", min_len),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_required_field() {
        assert!(validate_required("field", "value").is_ok());
        assert!(validate_required("field", "   ").is_err());
    }

    #[test]
    fn validates_max_len_in_characters() {
        assert!(validate_max_len("field", "abc", 3).is_ok());
        assert!(validate_max_len("field", "abcd", 3).is_err());
        assert!(validate_max_len("field", "ঢাকা", 4).is_ok());
    }

    #[test]
    fn sanitizes_string() {
        assert_eq!(sanitize_string("  hello\tworld  "), "hello world");
        assert_eq!(sanitize_string(" \n "), "");
        assert_eq!(sanitize_string("ab\u{0000}cd\u{0007}"), "abcd");
        assert_eq!(sanitize_string("Rahim\r\nUddin"), "Rahim Uddin");
    }

    #[test]
    fn recognizes_email_addresses() {
        assert!(is_valid_email("donor@example.com"));
        assert!(is_valid_email("a.b+tag@mail.example.org"));
        assert!(!is_valid_email("donor@example"));
        assert!(!is_valid_email("donor@.com"));
        assert!(!is_valid_email("donor@example."));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("do nor@example.com"));
        assert!(!is_valid_email("a@b@example.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn validates_phone_digits() {
        assert!(validate_phone("01712345678").is_ok());
        assert!(validate_phone("880171234567890").is_ok());
        assert!(validate_phone("0171234567").is_err());
        assert!(validate_phone("8801712345678901").is_err());
        assert!(validate_phone("+8801712345678").is_err());
    }

    #[test]
    fn validates_username_length() {
        assert!(validate_username("rahim").is_ok());
        assert!(validate_username("ra").is_err());
        assert!(validate_username(&"r".repeat(31)).is_err());
    }

    #[test]
    fn validates_password_length() {
        assert!(validate_password("password", "secret", PASSWORD_MIN_LEN).is_ok());
        assert!(validate_password("password", "short", PASSWORD_MIN_LEN).is_err());
        assert!(validate_password("newPassword", "secret1", NEW_PASSWORD_MIN_LEN).is_err());
    }
}
