//! Security Module
//!
//! Credential and account input validation.

pub mod validation;

pub use validation::{
    ValidationError, ValidationResult, validate_email, validate_name, validate_new_password,
    validate_password,
};
