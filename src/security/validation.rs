//! Input Validation Module
//!
//! Checks applied to credentials before they reach the auth capability.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use validator::ValidateEmail;

use crate::error::AppError;

pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_PASSWORD_LENGTH: usize = 72;
pub const MAX_NAME_LENGTH: usize = 100;

static HAS_LETTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]").expect("valid letter pattern"));
static HAS_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]").expect("valid digit pattern"));

/// Validation error types
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Required field '{field}' is missing")]
    MissingField { field: String },

    #[error("Field '{field}' is too long (max: {max}, got: {got})")]
    TooLong {
        field: String,
        max: usize,
        got: usize,
    },

    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Password must contain at least one letter and one number")]
    WeakPassword,

    #[error("Passwords do not match")]
    ConfirmationMismatch,

    #[error("'{value}' is not a valid email address")]
    InvalidEmail { value: String },
}

impl ValidationError {
    pub fn field(&self) -> &str {
        match self {
            Self::MissingField { field } | Self::TooLong { field, .. } => field.as_str(),
            Self::PasswordTooShort { .. } | Self::WeakPassword | Self::ConfirmationMismatch => {
                "password"
            }
            Self::InvalidEmail { .. } => "email",
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

pub type ValidationResult = std::result::Result<(), ValidationError>;

pub fn validate_email(email: &str) -> ValidationResult {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::MissingField {
            field: "email".to_string(),
        });
    }
    if !email.to_string().validate_email() {
        return Err(ValidationError::InvalidEmail {
            value: email.to_string(),
        });
    }
    Ok(())
}

/// Length plus a letter and a digit.
pub fn validate_password(password: &str) -> ValidationResult {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LENGTH,
        });
    }
    if len > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong {
            field: "password".to_string(),
            max: MAX_PASSWORD_LENGTH,
            got: len,
        });
    }
    if !HAS_LETTER.is_match(password) || !HAS_DIGIT.is_match(password) {
        return Err(ValidationError::WeakPassword);
    }
    Ok(())
}

pub fn validate_new_password(password: &str, confirmation: &str) -> ValidationResult {
    if password != confirmation {
        return Err(ValidationError::ConfirmationMismatch);
    }
    validate_password(password)
}

pub fn validate_name(name: &str) -> ValidationResult {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingField {
            field: "name".to_string(),
        });
    }
    let len = name.chars().count();
    if len > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_NAME_LENGTH,
            got: len,
        });
    }
    Ok(())
}
